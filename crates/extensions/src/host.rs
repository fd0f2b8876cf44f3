//! Capabilities the host hands to the runtime.
//!
//! The runtime never sees the host's session or UI types. Everything an
//! extension may ask of the host goes through these traits, supplied once via
//! [`ExtensionRunner::bind_core`](crate::runner::ExtensionRunner::bind_core).

use {anyhow::Result, async_trait::async_trait, serde_json::Value};

use crate::types::{CustomMessage, DeliverAs, ModelRef, ProviderConfig, ThinkingLevel};

/// Session-level actions extensions may trigger.
#[async_trait]
pub trait HostActions: Send + Sync {
    async fn send_message(&self, message: CustomMessage, deliver_as: Option<DeliverAs>)
    -> Result<()>;

    async fn send_user_message(&self, text: String, deliver_as: Option<DeliverAs>) -> Result<()>;

    /// Persist extension state in the session without showing it to the model.
    fn append_entry(&self, custom_type: &str, data: Value) -> Result<()>;

    fn set_session_name(&self, name: &str) -> Result<()>;

    fn active_tools(&self) -> Vec<String>;

    fn set_active_tools(&self, names: Vec<String>);

    /// Returns `false` when no credentials are available for the model.
    async fn set_model(&self, model: ModelRef) -> Result<bool>;

    fn thinking_level(&self) -> ThinkingLevel;

    fn set_thinking_level(&self, level: ThinkingLevel);
}

/// Read access to the live agent state, plus run control.
pub trait ContextActions: Send + Sync {
    fn model(&self) -> Option<ModelRef>;

    fn is_idle(&self) -> bool;

    fn abort(&self);

    fn has_pending_messages(&self) -> bool;

    fn shutdown(&self);
}

/// The host's model registry. Its own matching and overwrite rules decide
/// what a repeated registration means.
pub trait ModelRegistry: Send + Sync {
    fn register_provider(&self, name: &str, config: &ProviderConfig) -> Result<()>;

    fn unregister_provider(&self, name: &str) -> Result<()>;
}
