//! Capability handler traits and the registration records extensions produce.

use std::{fmt, future::Future, sync::Arc};

use {
    anyhow::Result,
    async_trait::async_trait,
    pion_common::KeyChord,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::{
    context::ExtensionContext,
    events::{ExtensionEvent, HandlerReply},
    types::{ContentBlock, CustomMessage},
};

// ── Handler traits ──────────────────────────────────────────────────────────

/// Handles one subscribed event type.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ExtensionEvent, ctx: &ExtensionContext)
    -> Result<HandlerReply>;
}

#[async_trait]
pub trait ShortcutHandler: Send + Sync {
    async fn run(&self, ctx: &ExtensionContext) -> Result<()>;
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// `args` is everything after the command name, trimmed.
    async fn run(&self, args: &str, ctx: &ExtensionContext) -> Result<()>;
}

/// What a tool returns to the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        tool_call_id: &str,
        params: Value,
        ctx: &ExtensionContext,
    ) -> Result<ToolOutput>;
}

/// Turns a custom message into display lines. `None` falls back to the
/// host's default rendering.
pub trait MessageRenderer: Send + Sync {
    fn render(&self, message: &CustomMessage, expanded: bool) -> Option<Vec<String>>;
}

// ── Closure adapters ────────────────────────────────────────────────────────

struct FnEventHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
where
    F: Fn(ExtensionEvent, ExtensionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerReply>> + Send + 'static,
{
    async fn handle(
        &self,
        event: &ExtensionEvent,
        ctx: &ExtensionContext,
    ) -> Result<HandlerReply> {
        (self.0)(event.clone(), ctx.clone()).await
    }
}

/// Wrap an async closure as an [`EventHandler`].
pub fn event_handler<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(ExtensionEvent, ExtensionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerReply>> + Send + 'static,
{
    Arc::new(FnEventHandler(f))
}

struct FnShortcutHandler<F>(F);

#[async_trait]
impl<F, Fut> ShortcutHandler for FnShortcutHandler<F>
where
    F: Fn(ExtensionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: &ExtensionContext) -> Result<()> {
        (self.0)(ctx.clone()).await
    }
}

pub fn shortcut_handler<F, Fut>(f: F) -> Arc<dyn ShortcutHandler>
where
    F: Fn(ExtensionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnShortcutHandler(f))
}

struct FnCommandHandler<F>(F);

#[async_trait]
impl<F, Fut> CommandHandler for FnCommandHandler<F>
where
    F: Fn(String, ExtensionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, args: &str, ctx: &ExtensionContext) -> Result<()> {
        (self.0)(args.to_string(), ctx.clone()).await
    }
}

pub fn command_handler<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(String, ExtensionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnCommandHandler(f))
}

// ── Registration records ────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ShortcutRegistration {
    pub chord: KeyChord,
    pub description: Option<String>,
    pub handler: Arc<dyn ShortcutHandler>,
    pub extension_path: String,
}

impl fmt::Debug for ShortcutRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShortcutRegistration")
            .field("chord", &self.chord)
            .field("description", &self.description)
            .field("extension_path", &self.extension_path)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct CommandRegistration {
    pub name: String,
    pub description: Option<String>,
    pub handler: Arc<dyn CommandHandler>,
    pub extension_path: String,
}

impl fmt::Debug for CommandRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistration")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("extension_path", &self.extension_path)
            .finish_non_exhaustive()
    }
}

/// A tool the agent can call.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub label: String,
    pub description: String,
    /// JSON schema of the parameters object.
    pub parameters: Value,
    pub executor: Arc<dyn ToolExecutor>,
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub extension_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind {
    Boolean,
    String,
}

/// A CLI-style flag an extension reads at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: FlagKind,
    #[serde(default)]
    pub default: Option<Value>,
}

impl FlagDefinition {
    pub fn boolean(name: impl Into<String>, default: Option<bool>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: FlagKind::Boolean,
            default: default.map(Value::Bool),
        }
    }

    pub fn string(name: impl Into<String>, default: Option<&str>) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind: FlagKind::String,
            default: default.map(Value::from),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredFlag {
    pub definition: FlagDefinition,
    pub extension_path: String,
}

#[derive(Clone)]
pub struct RendererRegistration {
    pub custom_type: String,
    pub renderer: Arc<dyn MessageRenderer>,
    pub extension_path: String,
}
