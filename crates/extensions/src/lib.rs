//! Extension host runtime.
//!
//! Extensions register capabilities through [`ExtensionApi`] while they load.
//! The host then wraps the loaded [`Extension`]s in an [`ExtensionRunner`],
//! which resolves shortcut and command conflicts against the host's built-in
//! tables, dispatches events to handlers in order, and flushes provider
//! registrations once [`ExtensionRunner::bind_core`] supplies the host
//! capabilities.

pub mod api;
pub mod capabilities;
pub mod conflicts;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod host;
pub mod runner;
pub mod runtime;
pub mod types;

pub use {
    api::{Extension, ExtensionApi},
    capabilities::{
        CommandHandler, CommandRegistration, EventHandler, FlagDefinition, FlagKind,
        MessageRenderer, RegisteredFlag, RegisteredTool, ShortcutHandler, ShortcutRegistration,
        ToolDefinition, ToolExecutor, ToolOutput, command_handler, event_handler,
        shortcut_handler,
    },
    conflicts::{
        CommandResolution, Diagnostic, ShortcutConflict, ShortcutResolution, ShortcutWarning,
        resolve_commands, resolve_shortcuts,
    },
    context::ExtensionContext,
    dispatcher::{ErrorListener, EventDispatcher, ExtensionError, ListenerId, Step},
    error::{Error, Result},
    events::{
        ExtensionEvent, ExtensionEventType, HandlerReply, InputOutcome, InputReply,
        ToolCallBlock, ToolResultOutcome, ToolResultPatch,
    },
    host::{ContextActions, HostActions, ModelRegistry},
    runner::ExtensionRunner,
    runtime::{BindReport, ExtensionRuntime, PendingProvider, ProviderFailure},
    types::{ContentBlock, CustomMessage, DeliverAs, ModelRef, ProviderConfig, ThinkingLevel},
};

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod testing {
    //! Host stubs shared by the unit tests.

    use std::{
        collections::BTreeMap,
        sync::{
            Mutex,
            atomic::{AtomicBool, Ordering},
        },
    };

    use {anyhow::Result, async_trait::async_trait, serde_json::Value};

    use crate::{
        capabilities::{MessageRenderer, ToolExecutor, ToolOutput},
        context::ExtensionContext,
        host::{ContextActions, HostActions, ModelRegistry},
        types::{
            ContentBlock, CustomMessage, DeliverAs, ModelRef, ProviderConfig, ThinkingLevel,
        },
    };

    #[derive(Default)]
    pub struct StubActions {
        pub sent: Mutex<Vec<CustomMessage>>,
        pub user_messages: Mutex<Vec<String>>,
        pub tools: Mutex<Vec<String>>,
        pub thinking: Mutex<ThinkingLevel>,
    }

    #[async_trait]
    impl HostActions for StubActions {
        async fn send_message(
            &self,
            message: CustomMessage,
            _deliver_as: Option<DeliverAs>,
        ) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn send_user_message(
            &self,
            text: String,
            _deliver_as: Option<DeliverAs>,
        ) -> Result<()> {
            self.user_messages.lock().unwrap().push(text);
            Ok(())
        }

        fn append_entry(&self, _custom_type: &str, _data: Value) -> Result<()> {
            Ok(())
        }

        fn set_session_name(&self, _name: &str) -> Result<()> {
            Ok(())
        }

        fn active_tools(&self) -> Vec<String> {
            self.tools.lock().unwrap().clone()
        }

        fn set_active_tools(&self, names: Vec<String>) {
            *self.tools.lock().unwrap() = names;
        }

        async fn set_model(&self, _model: ModelRef) -> Result<bool> {
            Ok(true)
        }

        fn thinking_level(&self) -> ThinkingLevel {
            *self.thinking.lock().unwrap()
        }

        fn set_thinking_level(&self, level: ThinkingLevel) {
            *self.thinking.lock().unwrap() = level;
        }
    }

    #[derive(Default)]
    pub struct StubContext {
        pub model: Option<ModelRef>,
        pub aborted: AtomicBool,
    }

    impl ContextActions for StubContext {
        fn model(&self) -> Option<ModelRef> {
            self.model.clone()
        }

        fn is_idle(&self) -> bool {
            true
        }

        fn abort(&self) {
            self.aborted.store(true, Ordering::SeqCst);
        }

        fn has_pending_messages(&self) -> bool {
            false
        }

        fn shutdown(&self) {}
    }

    /// Records every call as `register:<name>:<first model id>` or
    /// `unregister:<name>`.
    #[derive(Default)]
    pub struct RecordingRegistry {
        calls: Mutex<Vec<String>>,
        providers: Mutex<BTreeMap<String, ProviderConfig>>,
        reject: Option<String>,
    }

    impl RecordingRegistry {
        pub fn rejecting(name: &str) -> Self {
            Self {
                reject: Some(name.to_string()),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn has_provider(&self, name: &str) -> bool {
            self.providers.lock().unwrap().contains_key(name)
        }
    }

    impl ModelRegistry for RecordingRegistry {
        fn register_provider(&self, name: &str, config: &ProviderConfig) -> Result<()> {
            let model = config.models.first().map_or("", |m| m.id.as_str());
            self.calls
                .lock()
                .unwrap()
                .push(format!("register:{name}:{model}"));
            if self.reject.as_deref() == Some(name) {
                anyhow::bail!("provider {name} rejected");
            }
            self.providers
                .lock()
                .unwrap()
                .insert(name.to_string(), config.clone());
            Ok(())
        }

        fn unregister_provider(&self, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("unregister:{name}"));
            self.providers.lock().unwrap().remove(name);
            Ok(())
        }
    }

    /// Answers with `"<call id> <params>"`.
    pub struct EchoTool;

    #[async_trait]
    impl ToolExecutor for EchoTool {
        async fn execute(
            &self,
            tool_call_id: &str,
            params: Value,
            _ctx: &ExtensionContext,
        ) -> Result<ToolOutput> {
            Ok(ToolOutput {
                content: vec![ContentBlock::text(format!("{tool_call_id} {params}"))],
                details: None,
            })
        }
    }

    /// One line per text block.
    pub struct PlainRenderer;

    impl MessageRenderer for PlainRenderer {
        fn render(&self, message: &CustomMessage, _expanded: bool) -> Option<Vec<String>> {
            Some(
                message
                    .content
                    .iter()
                    .filter_map(ContentBlock::as_text)
                    .map(str::to_string)
                    .collect(),
            )
        }
    }
}
