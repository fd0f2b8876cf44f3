//! Ordered, fault-isolated delivery of events to extension handlers.
//!
//! Handlers for one event run one after another in load order, each awaited
//! to completion before the next starts. Every dispatch threads an
//! accumulator through the chain: each handler sees the event as built from
//! the current accumulator, and its reply is folded into the next
//! accumulator. A handler that fails or panics leaves the accumulator as it
//! was and is reported to the error listeners.

use std::{
    any::Any,
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    futures::FutureExt,
    serde::Serialize,
    tracing::{debug, warn},
};

use crate::{
    api::Extension,
    capabilities::EventHandler,
    context::ExtensionContext,
    events::{ExtensionEvent, ExtensionEventType, HandlerReply},
};

/// A failure raised by one handler or command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionError {
    pub extension_path: String,
    /// Event type, or `command:<name>` / `shortcut:<chord>` for direct
    /// invocations.
    pub event: String,
    pub error: String,
}

pub type ErrorListener = Arc<dyn Fn(&ExtensionError) + Send + Sync>;

/// Handle returned by [`EventDispatcher::on_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What the reducer wants after folding one reply.
pub enum Step<A> {
    Next(A),
    /// Skip the remaining handlers.
    Stop(A),
}

struct HandlerEntry {
    extension_path: String,
    handler: Arc<dyn EventHandler>,
}

pub struct EventDispatcher {
    handlers: HashMap<ExtensionEventType, Vec<HandlerEntry>>,
    listeners: Mutex<Vec<(ListenerId, ErrorListener)>>,
    next_listener: AtomicU64,
}

impl EventDispatcher {
    /// Index handlers by event type, keeping load order then declaration
    /// order.
    pub fn from_extensions(extensions: &[Extension]) -> Self {
        let mut handlers: HashMap<ExtensionEventType, Vec<HandlerEntry>> = HashMap::new();
        for extension in extensions {
            for (event, handler) in extension.handlers() {
                handlers.entry(*event).or_default().push(HandlerEntry {
                    extension_path: extension.path().to_string(),
                    handler: Arc::clone(handler),
                });
            }
        }
        Self {
            handlers,
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        }
    }

    pub fn has_handlers(&self, event: ExtensionEventType) -> bool {
        self.handlers.get(&event).is_some_and(|v| !v.is_empty())
    }

    pub fn handler_count(&self, event: ExtensionEventType) -> usize {
        self.handlers.get(&event).map_or(0, Vec::len)
    }

    pub fn on_error(&self, listener: ErrorListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, listener));
        id
    }

    /// Returns `false` if the listener was already removed.
    pub fn off_error(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Log the failure and hand it to every listener registered right now.
    pub fn report(&self, error: ExtensionError) {
        warn!(
            extension = %error.extension_path,
            event = %error.event,
            error = %error.error,
            "extension handler failed"
        );
        let listeners: Vec<ErrorListener> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&error);
        }
    }

    /// Run every handler for `event_type` in order.
    ///
    /// `view` builds the event a handler sees from the current accumulator;
    /// `reduce` folds the handler's reply into the next accumulator.
    pub async fn dispatch<A, V, R>(
        &self,
        event_type: ExtensionEventType,
        ctx: &ExtensionContext,
        init: A,
        view: V,
        reduce: R,
    ) -> A
    where
        V: Fn(&A) -> ExtensionEvent,
        R: Fn(A, HandlerReply, &str) -> Step<A>,
    {
        let Some(handlers) = self.handlers.get(&event_type) else {
            return init;
        };
        debug!(event = %event_type, count = handlers.len(), "dispatching extension event");

        let mut acc = init;
        for entry in handlers {
            let event = view(&acc);
            let outcome = AssertUnwindSafe(entry.handler.handle(&event, ctx))
                .catch_unwind()
                .await;
            let error = match outcome {
                Ok(Ok(reply)) => match reduce(acc, reply, &entry.extension_path) {
                    Step::Next(next) => {
                        acc = next;
                        continue;
                    },
                    Step::Stop(done) => {
                        debug!(
                            event = %event_type,
                            extension = %entry.extension_path,
                            "extension handler stopped dispatch"
                        );
                        return done;
                    },
                },
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => panic_message(payload.as_ref()),
            };
            self.report(ExtensionError {
                extension_path: entry.extension_path.clone(),
                event: event_type.to_string(),
                error,
            });
        }
        acc
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
