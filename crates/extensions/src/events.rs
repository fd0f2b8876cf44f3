//! Events delivered to extension handlers and the replies handlers return.

use std::fmt;

use {
    serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned},
    serde_json::Value,
};

use crate::{
    error::{Context, Result},
    types::{ContentBlock, CustomMessage, ModelRef},
};

// ── ExtensionEventType ──────────────────────────────────────────────────────

/// Event kinds extensions can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionEventType {
    SessionStart,
    SessionBeforeSwitch,
    SessionSwitch,
    SessionBeforeFork,
    SessionFork,
    SessionBeforeCompact,
    SessionCompact,
    SessionBeforeTree,
    SessionTree,
    SessionShutdown,
    Context,
    BeforeAgentStart,
    AgentStart,
    AgentEnd,
    TurnStart,
    TurnEnd,
    MessageStart,
    MessageEnd,
    ToolExecutionStart,
    ToolExecutionEnd,
    ModelSelect,
    Input,
    ToolCall,
    ToolResult,
}

impl ExtensionEventType {
    pub const ALL: &'static [ExtensionEventType] = &[
        Self::SessionStart,
        Self::SessionBeforeSwitch,
        Self::SessionSwitch,
        Self::SessionBeforeFork,
        Self::SessionFork,
        Self::SessionBeforeCompact,
        Self::SessionCompact,
        Self::SessionBeforeTree,
        Self::SessionTree,
        Self::SessionShutdown,
        Self::Context,
        Self::BeforeAgentStart,
        Self::AgentStart,
        Self::AgentEnd,
        Self::TurnStart,
        Self::TurnEnd,
        Self::MessageStart,
        Self::MessageEnd,
        Self::ToolExecutionStart,
        Self::ToolExecutionEnd,
        Self::ModelSelect,
        Self::Input,
        Self::ToolCall,
        Self::ToolResult,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStart => "session_start",
            Self::SessionBeforeSwitch => "session_before_switch",
            Self::SessionSwitch => "session_switch",
            Self::SessionBeforeFork => "session_before_fork",
            Self::SessionFork => "session_fork",
            Self::SessionBeforeCompact => "session_before_compact",
            Self::SessionCompact => "session_compact",
            Self::SessionBeforeTree => "session_before_tree",
            Self::SessionTree => "session_tree",
            Self::SessionShutdown => "session_shutdown",
            Self::Context => "context",
            Self::BeforeAgentStart => "before_agent_start",
            Self::AgentStart => "agent_start",
            Self::AgentEnd => "agent_end",
            Self::TurnStart => "turn_start",
            Self::TurnEnd => "turn_end",
            Self::MessageStart => "message_start",
            Self::MessageEnd => "message_end",
            Self::ToolExecutionStart => "tool_execution_start",
            Self::ToolExecutionEnd => "tool_execution_end",
            Self::ModelSelect => "model_select",
            Self::Input => "input",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
        }
    }

    /// `session_before_*` events, whose handlers may cancel the operation.
    pub const fn is_cancellable(&self) -> bool {
        matches!(
            self,
            Self::SessionBeforeSwitch
                | Self::SessionBeforeFork
                | Self::SessionBeforeCompact
                | Self::SessionBeforeTree
        )
    }
}

impl fmt::Display for ExtensionEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Payloads ────────────────────────────────────────────────────────────────

/// A tool is about to run. Handlers may block it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEvent {
    pub tool_name: String,
    pub tool_call_id: String,
    pub input: Value,
}

/// A tool finished. Handlers may patch `content`, `details` and `is_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultEvent {
    pub tool_name: String,
    pub tool_call_id: String,
    pub input: Value,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

/// Messages about to be sent to the model. Handlers may replace the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEvent {
    pub messages: Vec<Value>,
}

/// A prompt is about to start an agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeforeAgentStartEvent {
    pub prompt: String,
    #[serde(default)]
    pub images: Vec<ContentBlock>,
    pub system_prompt: String,
}

/// Raw user input before it becomes a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub text: String,
    #[serde(default)]
    pub images: Vec<ContentBlock>,
    /// `interactive`, `rpc` or `extension`.
    pub source: String,
}

/// Every event an extension can observe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionEvent {
    #[serde(rename_all = "camelCase")]
    SessionStart { session_id: String },
    #[serde(rename_all = "camelCase")]
    SessionBeforeSwitch {
        /// `new` or `resume`.
        reason: String,
        target_session: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SessionSwitch {
        previous_session: Option<String>,
        session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SessionBeforeFork { entry_id: String },
    #[serde(rename_all = "camelCase")]
    SessionFork {
        previous_session: Option<String>,
        session_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SessionBeforeCompact { message_count: usize },
    SessionCompact { summary: String },
    #[serde(rename_all = "camelCase")]
    SessionBeforeTree { target_id: String },
    #[serde(rename_all = "camelCase")]
    SessionTree { new_leaf_id: Option<String> },
    SessionShutdown,
    Context(ContextEvent),
    BeforeAgentStart(BeforeAgentStartEvent),
    AgentStart,
    AgentEnd { messages: Vec<Value> },
    #[serde(rename_all = "camelCase")]
    TurnStart { turn_index: usize },
    #[serde(rename_all = "camelCase")]
    TurnEnd { turn_index: usize, message: Value },
    MessageStart { message: Value },
    MessageEnd { message: Value },
    #[serde(rename_all = "camelCase")]
    ToolExecutionStart {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolExecutionEnd {
        tool_call_id: String,
        tool_name: String,
        is_error: bool,
    },
    #[serde(rename_all = "camelCase")]
    ModelSelect {
        model: ModelRef,
        previous_model: Option<ModelRef>,
        /// `set`, `cycle` or `restore`.
        source: String,
    },
    Input(InputEvent),
    ToolCall(ToolCallEvent),
    ToolResult(ToolResultEvent),
}

impl ExtensionEvent {
    /// Returns the [`ExtensionEventType`] that matches this payload.
    pub fn event_type(&self) -> ExtensionEventType {
        match self {
            Self::SessionStart { .. } => ExtensionEventType::SessionStart,
            Self::SessionBeforeSwitch { .. } => ExtensionEventType::SessionBeforeSwitch,
            Self::SessionSwitch { .. } => ExtensionEventType::SessionSwitch,
            Self::SessionBeforeFork { .. } => ExtensionEventType::SessionBeforeFork,
            Self::SessionFork { .. } => ExtensionEventType::SessionFork,
            Self::SessionBeforeCompact { .. } => ExtensionEventType::SessionBeforeCompact,
            Self::SessionCompact { .. } => ExtensionEventType::SessionCompact,
            Self::SessionBeforeTree { .. } => ExtensionEventType::SessionBeforeTree,
            Self::SessionTree { .. } => ExtensionEventType::SessionTree,
            Self::SessionShutdown => ExtensionEventType::SessionShutdown,
            Self::Context(_) => ExtensionEventType::Context,
            Self::BeforeAgentStart(_) => ExtensionEventType::BeforeAgentStart,
            Self::AgentStart => ExtensionEventType::AgentStart,
            Self::AgentEnd { .. } => ExtensionEventType::AgentEnd,
            Self::TurnStart { .. } => ExtensionEventType::TurnStart,
            Self::TurnEnd { .. } => ExtensionEventType::TurnEnd,
            Self::MessageStart { .. } => ExtensionEventType::MessageStart,
            Self::MessageEnd { .. } => ExtensionEventType::MessageEnd,
            Self::ToolExecutionStart { .. } => ExtensionEventType::ToolExecutionStart,
            Self::ToolExecutionEnd { .. } => ExtensionEventType::ToolExecutionEnd,
            Self::ModelSelect { .. } => ExtensionEventType::ModelSelect,
            Self::Input(_) => ExtensionEventType::Input,
            Self::ToolCall(_) => ExtensionEventType::ToolCall,
            Self::ToolResult(_) => ExtensionEventType::ToolResult,
        }
    }
}

// ── Replies ─────────────────────────────────────────────────────────────────

/// Partial update to a tool result. Present fields replace the current value
/// wholesale; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentBlock>>,
    /// `Some(None)` clears the details; `None` keeps them.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub details: Option<Option<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Marks a field as present even when its value is `null`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl ToolResultPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.details.is_none() && self.is_error.is_none()
    }
}

/// The mutable part of a tool result, threaded through `tool_result`
/// handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultOutcome {
    pub content: Vec<ContentBlock>,
    pub details: Option<Value>,
    pub is_error: bool,
}

impl ToolResultOutcome {
    pub fn from_event(event: &ToolResultEvent) -> Self {
        Self {
            content: event.content.clone(),
            details: event.details.clone(),
            is_error: event.is_error,
        }
    }

    /// Apply a patch, producing the next accumulator value.
    #[must_use]
    pub fn apply(self, patch: ToolResultPatch) -> Self {
        Self {
            content: patch.content.unwrap_or(self.content),
            details: patch.details.unwrap_or(self.details),
            is_error: patch.is_error.unwrap_or(self.is_error),
        }
    }

    /// `event` with this outcome substituted for its mutable fields.
    pub fn substitute_into(&self, event: &ToolResultEvent) -> ToolResultEvent {
        ToolResultEvent {
            content: self.content.clone(),
            details: self.details.clone(),
            is_error: self.is_error,
            ..event.clone()
        }
    }
}

/// A `tool_call` handler's decision to stop the tool from running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallBlock {
    pub extension_path: String,
    pub reason: Option<String>,
}

/// What a `before_agent_start` handler contributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeforeAgentStartReply {
    /// Injected into the session before the prompt.
    #[serde(default)]
    pub message: Option<CustomMessage>,
    /// Replaces the system prompt for this run; later handlers see it.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Combined result of all `before_agent_start` handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct BeforeAgentStartOutcome {
    pub system_prompt: String,
    pub messages: Vec<CustomMessage>,
}

/// What an `input` handler does with the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InputReply {
    Continue,
    Transform {
        text: String,
        #[serde(default)]
        images: Option<Vec<ContentBlock>>,
    },
    /// The extension consumed the input; the host must not prompt the agent.
    Handled,
}

/// Combined result of all `input` handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    Continue,
    Transformed {
        text: String,
        images: Vec<ContentBlock>,
    },
    Handled {
        extension_path: String,
    },
}

/// The outcome a handler returns.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum HandlerReply {
    /// Nothing to change.
    #[default]
    Continue,
    /// `tool_result` only.
    PatchToolResult(ToolResultPatch),
    /// `tool_call` only.
    BlockToolCall { reason: Option<String> },
    /// `context` only.
    ReplaceMessages(Vec<Value>),
    /// `before_agent_start` only.
    BeforeAgentStart(BeforeAgentStartReply),
    /// `input` only.
    Input(InputReply),
    /// `session_before_*` only.
    Cancel,
}

#[derive(Deserialize)]
struct ToolCallReplyWire {
    #[serde(default)]
    block: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct ContextReplyWire {
    #[serde(default)]
    messages: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct CancelReplyWire {
    #[serde(default)]
    cancel: bool,
}

fn parse_reply<T: DeserializeOwned>(event_type: ExtensionEventType, value: Value) -> Result<T> {
    serde_json::from_value(value).with_context(|| format!("invalid {event_type} handler reply"))
}

impl HandlerReply {
    /// Interpret a JSON value returned by a script-hosted handler for the
    /// given event type. `null` means no change.
    pub fn from_json(event_type: ExtensionEventType, value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::Continue);
        }
        let reply = match event_type {
            ExtensionEventType::ToolResult => {
                let patch: ToolResultPatch = parse_reply(event_type, value)?;
                if patch.is_empty() {
                    Self::Continue
                } else {
                    Self::PatchToolResult(patch)
                }
            },
            ExtensionEventType::ToolCall => {
                let wire: ToolCallReplyWire = parse_reply(event_type, value)?;
                if wire.block {
                    Self::BlockToolCall {
                        reason: wire.reason,
                    }
                } else {
                    Self::Continue
                }
            },
            ExtensionEventType::Context => {
                let wire: ContextReplyWire = parse_reply(event_type, value)?;
                wire.messages.map_or(Self::Continue, Self::ReplaceMessages)
            },
            ExtensionEventType::BeforeAgentStart => {
                Self::BeforeAgentStart(parse_reply(event_type, value)?)
            },
            ExtensionEventType::Input => Self::Input(parse_reply(event_type, value)?),
            t if t.is_cancellable() => {
                let wire: CancelReplyWire = parse_reply(event_type, value)?;
                if wire.cancel {
                    Self::Cancel
                } else {
                    Self::Continue
                }
            },
            _ => Self::Continue,
        };
        Ok(reply)
    }
}
