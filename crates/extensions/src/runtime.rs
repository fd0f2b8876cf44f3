//! Process-wide runtime state shared by every loaded extension and the host.
//!
//! Provider registrations go through a two-state lifecycle. While unbound,
//! registrations queue up because the host is not ready yet.
//! [`ExtensionRuntime::bind`] flushes the queue into the model registry
//! exactly once and switches to the bound state, after which every call goes
//! straight to the registry.

use std::{
    collections::{BTreeMap, HashMap},
    mem,
    sync::{Arc, Mutex, MutexGuard},
};

use {
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    host::{ContextActions, HostActions, ModelRegistry},
    types::ProviderConfig,
};

/// A provider registration waiting for the host to bind.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingProvider {
    pub name: String,
    pub config: ProviderConfig,
}

/// A queued provider the registry refused during the bind flush.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of flushing the provider queue on bind.
#[derive(Debug, Clone, Default)]
pub struct BindReport {
    pub registered: usize,
    pub failures: Vec<ProviderFailure>,
}

struct BoundCore {
    actions: Arc<dyn HostActions>,
    context: Arc<dyn ContextActions>,
    registry: Arc<dyn ModelRegistry>,
}

enum Lifecycle {
    Unbound { pending: Vec<PendingProvider> },
    Bound(BoundCore),
}

/// Capability kinds whose names are claimed first-come across extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum CapabilityKind {
    Tool,
    Command,
    Flag,
    MessageRenderer,
}

pub(crate) enum Claim {
    /// Nobody owned the name; the caller now does.
    Granted,
    /// The caller already owned it (re-registration by the same extension).
    Owned,
    /// An earlier extension owns it.
    Taken { owner: String },
}

/// Shared state created before any extension loads.
pub struct ExtensionRuntime {
    lifecycle: Mutex<Lifecycle>,
    flag_values: Mutex<BTreeMap<String, Value>>,
    claims: Mutex<HashMap<(CapabilityKind, String), String>>,
}

impl ExtensionRuntime {
    pub fn new() -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle::Unbound {
                pending: Vec::new(),
            }),
            flag_values: Mutex::new(BTreeMap::new()),
            claims: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(*self.lock_lifecycle(), Lifecycle::Bound(_))
    }

    /// Queue the provider before bind, register it immediately after.
    ///
    /// Queued entries are not deduplicated: registering a name twice queues
    /// two entries and the registry sees both on flush.
    pub fn register_provider(&self, name: &str, config: ProviderConfig) -> Result<()> {
        let registry = {
            let mut lifecycle = self.lock_lifecycle();
            match &mut *lifecycle {
                Lifecycle::Unbound { pending } => {
                    pending.push(PendingProvider {
                        name: name.to_string(),
                        config,
                    });
                    debug!(provider = name, queued = pending.len(), "provider registration queued");
                    return Ok(());
                },
                Lifecycle::Bound(core) => Arc::clone(&core.registry),
            }
        };
        registry
            .register_provider(name, &config)
            .map_err(|e| Error::model_registry(name, &e))?;
        debug!(provider = name, "provider registered");
        Ok(())
    }

    /// Drop every queued entry for `name` before bind, unregister it from the
    /// model registry after.
    pub fn unregister_provider(&self, name: &str) -> Result<()> {
        let registry = {
            let mut lifecycle = self.lock_lifecycle();
            match &mut *lifecycle {
                Lifecycle::Unbound { pending } => {
                    let before = pending.len();
                    pending.retain(|p| p.name != name);
                    debug!(
                        provider = name,
                        removed = before - pending.len(),
                        "queued provider registrations removed"
                    );
                    return Ok(());
                },
                Lifecycle::Bound(core) => Arc::clone(&core.registry),
            }
        };
        registry
            .unregister_provider(name)
            .map_err(|e| Error::model_registry(name, &e))?;
        debug!(provider = name, "provider unregistered");
        Ok(())
    }

    /// Snapshot of the queue. Always empty once bound.
    pub fn pending_providers(&self) -> Vec<PendingProvider> {
        match &*self.lock_lifecycle() {
            Lifecycle::Unbound { pending } => pending.clone(),
            Lifecycle::Bound(_) => Vec::new(),
        }
    }

    /// Switch to the bound state and flush queued providers in queue order.
    ///
    /// A registry failure for one provider is logged and reported but does
    /// not stop the remaining entries from being applied.
    pub fn bind(
        &self,
        actions: Arc<dyn HostActions>,
        context: Arc<dyn ContextActions>,
        registry: Arc<dyn ModelRegistry>,
    ) -> Result<BindReport> {
        let pending = {
            let mut lifecycle = self.lock_lifecycle();
            if matches!(*lifecycle, Lifecycle::Bound(_)) {
                return Err(Error::AlreadyBound);
            }
            let previous = mem::replace(
                &mut *lifecycle,
                Lifecycle::Bound(BoundCore {
                    actions,
                    context,
                    registry: Arc::clone(&registry),
                }),
            );
            match previous {
                Lifecycle::Unbound { pending } => pending,
                Lifecycle::Bound(_) => Vec::new(),
            }
        };

        let mut report = BindReport::default();
        for PendingProvider { name, config } in pending {
            match registry.register_provider(&name, &config) {
                Ok(()) => report.registered += 1,
                Err(e) => {
                    warn!(provider = %name, error = %e, "queued provider registration failed");
                    report.failures.push(ProviderFailure {
                        name,
                        error: format!("{e:#}"),
                    });
                },
            }
        }
        info!(
            registered = report.registered,
            failed = report.failures.len(),
            "extension runtime bound"
        );
        Ok(report)
    }

    pub fn actions(&self) -> Result<Arc<dyn HostActions>> {
        match &*self.lock_lifecycle() {
            Lifecycle::Bound(core) => Ok(Arc::clone(&core.actions)),
            Lifecycle::Unbound { .. } => Err(Error::not_bound("host actions")),
        }
    }

    pub fn context_actions(&self) -> Result<Arc<dyn ContextActions>> {
        match &*self.lock_lifecycle() {
            Lifecycle::Bound(core) => Ok(Arc::clone(&core.context)),
            Lifecycle::Unbound { .. } => Err(Error::not_bound("context actions")),
        }
    }

    pub fn flag_value(&self, key: &str) -> Option<Value> {
        self.lock_flags().get(key).cloned()
    }

    /// Insert or overwrite a flag value. Takes effect immediately.
    pub fn set_flag_value(&self, key: impl Into<String>, value: Value) {
        self.lock_flags().insert(key.into(), value);
    }

    pub fn flag_values(&self) -> BTreeMap<String, Value> {
        self.lock_flags().clone()
    }

    pub(crate) fn claim(&self, kind: CapabilityKind, name: &str, extension_path: &str) -> Claim {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        match claims.get(&(kind, name.to_string())) {
            Some(owner) if owner == extension_path => Claim::Owned,
            Some(owner) => Claim::Taken {
                owner: owner.clone(),
            },
            None => {
                claims.insert((kind, name.to_string()), extension_path.to_string());
                Claim::Granted
            },
        }
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_flags(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.flag_values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ExtensionRuntime {
    fn default() -> Self {
        Self::new()
    }
}
