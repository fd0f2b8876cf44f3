use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::Value;

use crate::{
    error::Result,
    host::{ContextActions, HostActions},
    runtime::ExtensionRuntime,
    types::ModelRef,
};

/// Handed to every handler invocation.
///
/// Host capabilities are reached through the shared runtime, so a context
/// created before bind starts working as soon as the host binds.
#[derive(Clone)]
pub struct ExtensionContext {
    runtime: Arc<ExtensionRuntime>,
    cwd: PathBuf,
    has_ui: bool,
}

impl ExtensionContext {
    pub fn new(runtime: Arc<ExtensionRuntime>, cwd: PathBuf, has_ui: bool) -> Self {
        Self {
            runtime,
            cwd,
            has_ui,
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn has_ui(&self) -> bool {
        self.has_ui
    }

    pub fn runtime(&self) -> &Arc<ExtensionRuntime> {
        &self.runtime
    }

    pub fn actions(&self) -> Result<Arc<dyn HostActions>> {
        self.runtime.actions()
    }

    pub fn context_actions(&self) -> Result<Arc<dyn ContextActions>> {
        self.runtime.context_actions()
    }

    /// Current model, `None` before bind or when no model is selected.
    pub fn model(&self) -> Option<ModelRef> {
        self.runtime.context_actions().ok()?.model()
    }

    /// Before bind there is no agent run, so the host counts as idle.
    pub fn is_idle(&self) -> bool {
        self.runtime
            .context_actions()
            .map_or(true, |actions| actions.is_idle())
    }

    /// Abort the current agent run. Does nothing before bind.
    pub fn abort(&self) {
        if let Ok(actions) = self.runtime.context_actions() {
            actions.abort();
        }
    }

    pub fn flag(&self, name: &str) -> Option<Value> {
        self.runtime.flag_value(name)
    }
}
