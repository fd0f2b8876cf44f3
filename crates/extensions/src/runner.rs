//! The host-facing façade over loaded extensions.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use {
    futures::FutureExt,
    pion_config::KeybindingTable,
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{
    api::Extension,
    capabilities::{
        CommandRegistration, MessageRenderer, RegisteredFlag, RegisteredTool,
        ShortcutRegistration, ToolOutput,
    },
    conflicts::{Diagnostic, ShortcutResolution, resolve_commands, resolve_shortcuts},
    context::ExtensionContext,
    dispatcher::{ErrorListener, EventDispatcher, ExtensionError, ListenerId, Step, panic_message},
    error::{Error, Result},
    events::{
        BeforeAgentStartEvent, BeforeAgentStartOutcome, ContextEvent, ExtensionEvent,
        ExtensionEventType, HandlerReply, InputEvent, InputOutcome, InputReply, ToolCallBlock,
        ToolCallEvent, ToolResultEvent, ToolResultOutcome,
    },
    host::{ContextActions, HostActions, ModelRegistry},
    runtime::{BindReport, ExtensionRuntime},
    types::CustomMessage,
};

pub struct ExtensionRunner {
    extensions: Vec<Extension>,
    runtime: Arc<ExtensionRuntime>,
    registry: Arc<dyn ModelRegistry>,
    dispatcher: EventDispatcher,
    context: ExtensionContext,
    command_diagnostics: Mutex<Vec<Diagnostic>>,
}

impl ExtensionRunner {
    /// `extensions` must be in load order.
    pub fn new(
        extensions: Vec<Extension>,
        runtime: Arc<ExtensionRuntime>,
        registry: Arc<dyn ModelRegistry>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        let dispatcher = EventDispatcher::from_extensions(&extensions);
        let context = ExtensionContext::new(Arc::clone(&runtime), cwd.into(), false);
        info!(extensions = extensions.len(), "extension runner created");
        Self {
            extensions,
            runtime,
            registry,
            dispatcher,
            context,
            command_diagnostics: Mutex::new(Vec::new()),
        }
    }

    /// Mark the context handed to handlers as having an interactive UI.
    #[must_use]
    pub fn with_ui(mut self, has_ui: bool) -> Self {
        self.context = ExtensionContext::new(
            Arc::clone(&self.runtime),
            self.context.cwd().to_path_buf(),
            has_ui,
        );
        self
    }

    /// Give extensions access to the host and flush queued providers.
    /// Fails with [`Error::AlreadyBound`] on a second call.
    pub fn bind_core(
        &self,
        actions: Arc<dyn HostActions>,
        context: Arc<dyn ContextActions>,
    ) -> Result<BindReport> {
        self.runtime
            .bind(actions, context, Arc::clone(&self.registry))
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    pub fn runtime(&self) -> &Arc<ExtensionRuntime> {
        &self.runtime
    }

    pub fn context(&self) -> &ExtensionContext {
        &self.context
    }

    // ── Shortcuts and commands ──────────────────────────────────────────────

    /// Effective shortcut table for the host's current keybindings.
    pub fn shortcuts(
        &self,
        keybindings: &KeybindingTable,
        reserved_actions: &BTreeSet<String>,
    ) -> ShortcutResolution {
        resolve_shortcuts(&self.extensions, keybindings, reserved_actions)
    }

    /// Effective command list for the host's current reserved names. The
    /// diagnostics are kept for [`command_diagnostics`](Self::command_diagnostics).
    pub fn commands(&self, reserved_commands: &BTreeSet<String>) -> Vec<CommandRegistration> {
        let resolution = resolve_commands(&self.extensions, reserved_commands);
        *self
            .command_diagnostics
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = resolution.diagnostics;
        resolution.commands
    }

    /// Diagnostics from the most recent [`commands`](Self::commands) call.
    pub fn command_diagnostics(&self) -> Vec<Diagnostic> {
        self.command_diagnostics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn command(&self, name: &str) -> Option<CommandRegistration> {
        let name = name.trim_start_matches('/');
        self.extensions
            .iter()
            .flat_map(Extension::commands)
            .find(|c| c.name == name)
            .cloned()
    }

    /// Run a command by name. Returns `false` if no extension registered it.
    /// Handler failures go to the error listeners.
    pub async fn run_command(&self, name: &str, args: &str) -> bool {
        let Some(command) = self.command(name) else {
            return false;
        };
        debug!(
            extension = %command.extension_path,
            command = %command.name,
            "running extension command"
        );
        let outcome = AssertUnwindSafe(command.handler.run(args.trim(), &self.context))
            .catch_unwind()
            .await;
        let error = match outcome {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };
        self.dispatcher.report(ExtensionError {
            extension_path: command.extension_path,
            event: format!("command:{}", command.name),
            error,
        });
        true
    }

    /// Run a resolved shortcut. Handler failures go to the error listeners.
    pub async fn run_shortcut(&self, shortcut: &ShortcutRegistration) {
        let outcome = AssertUnwindSafe(shortcut.handler.run(&self.context))
            .catch_unwind()
            .await;
        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };
        self.dispatcher.report(ExtensionError {
            extension_path: shortcut.extension_path.clone(),
            event: format!("shortcut:{}", shortcut.chord),
            error,
        });
    }

    // ── Tools, flags, renderers ─────────────────────────────────────────────

    /// Every registered tool, one per name, first registration first.
    pub fn tools(&self) -> Vec<RegisteredTool> {
        let mut seen = HashSet::new();
        self.extensions
            .iter()
            .flat_map(Extension::tools)
            .filter(|t| seen.insert(t.definition.name.clone()))
            .cloned()
            .collect()
    }

    pub fn tool(&self, name: &str) -> Option<RegisteredTool> {
        self.extensions
            .iter()
            .flat_map(Extension::tools)
            .find(|t| t.definition.name == name)
            .cloned()
    }

    /// Execute a registered tool. `None` if no extension provides it.
    pub async fn execute_tool(
        &self,
        name: &str,
        tool_call_id: &str,
        params: Value,
    ) -> Option<Result<ToolOutput>> {
        let tool = self.tool(name)?;
        debug!(
            extension = %tool.extension_path,
            tool = name,
            tool_call_id,
            "executing extension tool"
        );
        let outcome = AssertUnwindSafe(
            tool.definition
                .executor
                .execute(tool_call_id, params, &self.context),
        )
        .catch_unwind()
        .await;
        let message = match outcome {
            Ok(Ok(output)) => return Some(Ok(output)),
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };
        warn!(
            extension = %tool.extension_path,
            tool = name,
            error = %message,
            "extension tool failed"
        );
        Some(Err(Error::Tool {
            tool: name.to_string(),
            message,
        }))
    }

    /// Every registered flag, one per name.
    pub fn flags(&self) -> BTreeMap<String, RegisteredFlag> {
        let mut flags = BTreeMap::new();
        for flag in self.extensions.iter().flat_map(Extension::flags) {
            flags
                .entry(flag.definition.name.clone())
                .or_insert_with(|| flag.clone());
        }
        flags
    }

    pub fn flag_values(&self) -> BTreeMap<String, Value> {
        self.runtime.flag_values()
    }

    pub fn set_flag_value(&self, key: impl Into<String>, value: Value) {
        self.runtime.set_flag_value(key, value);
    }

    /// Apply initial values, e.g. from configuration or the command line.
    /// Keys no extension registered are skipped. Returns how many applied.
    pub fn apply_flag_values(&self, values: &BTreeMap<String, Value>) -> usize {
        let known = self.flags();
        let mut applied = 0;
        for (key, value) in values {
            if !known.contains_key(key) {
                warn!(flag = %key, "no extension registered this flag, value ignored");
                continue;
            }
            self.runtime.set_flag_value(key.clone(), value.clone());
            applied += 1;
        }
        applied
    }

    pub fn message_renderer(&self, custom_type: &str) -> Option<Arc<dyn MessageRenderer>> {
        self.extensions
            .iter()
            .flat_map(Extension::renderers)
            .find(|r| r.custom_type == custom_type)
            .map(|r| Arc::clone(&r.renderer))
    }

    /// Render with the extension renderer for the message type, if any.
    pub fn render_message(&self, message: &CustomMessage, expanded: bool) -> Option<Vec<String>> {
        self.message_renderer(&message.custom_type)?
            .render(message, expanded)
    }

    // ── Events ──────────────────────────────────────────────────────────────

    pub fn has_handlers(&self, event: ExtensionEventType) -> bool {
        self.dispatcher.has_handlers(event)
    }

    pub fn on_error(&self, listener: ErrorListener) -> ListenerId {
        self.dispatcher.on_error(listener)
    }

    pub fn off_error(&self, id: ListenerId) -> bool {
        self.dispatcher.off_error(id)
    }

    /// Deliver an event whose replies carry no meaning.
    pub async fn emit(&self, event: ExtensionEvent) {
        self.dispatcher
            .dispatch(
                event.event_type(),
                &self.context,
                (),
                |_| event.clone(),
                |acc, _, _| Step::Next(acc),
            )
            .await;
    }

    /// `Some` if a handler blocked the tool. The first block wins.
    pub async fn emit_tool_call(&self, event: ToolCallEvent) -> Option<ToolCallBlock> {
        self.dispatcher
            .dispatch(
                ExtensionEventType::ToolCall,
                &self.context,
                None,
                |_| ExtensionEvent::ToolCall(event.clone()),
                |acc, reply, path| match reply {
                    HandlerReply::BlockToolCall { reason } => Step::Stop(Some(ToolCallBlock {
                        extension_path: path.to_string(),
                        reason,
                    })),
                    _ => Step::Next(acc),
                },
            )
            .await
    }

    /// Chain tool-result patches. Each handler sees the result as left by
    /// the handlers before it.
    pub async fn emit_tool_result(&self, event: ToolResultEvent) -> ToolResultOutcome {
        self.dispatcher
            .dispatch(
                ExtensionEventType::ToolResult,
                &self.context,
                ToolResultOutcome::from_event(&event),
                |acc| ExtensionEvent::ToolResult(acc.substitute_into(&event)),
                |acc, reply, _| match reply {
                    HandlerReply::PatchToolResult(patch) => Step::Next(acc.apply(patch)),
                    _ => Step::Next(acc),
                },
            )
            .await
    }

    /// Let handlers replace the messages sent to the model.
    pub async fn emit_context(&self, messages: Vec<Value>) -> Vec<Value> {
        self.dispatcher
            .dispatch(
                ExtensionEventType::Context,
                &self.context,
                messages,
                |acc| {
                    ExtensionEvent::Context(ContextEvent {
                        messages: acc.clone(),
                    })
                },
                |acc, reply, _| match reply {
                    HandlerReply::ReplaceMessages(messages) => Step::Next(messages),
                    _ => Step::Next(acc),
                },
            )
            .await
    }

    pub async fn emit_before_agent_start(
        &self,
        event: BeforeAgentStartEvent,
    ) -> BeforeAgentStartOutcome {
        let init = BeforeAgentStartOutcome {
            system_prompt: event.system_prompt.clone(),
            messages: Vec::new(),
        };
        self.dispatcher
            .dispatch(
                ExtensionEventType::BeforeAgentStart,
                &self.context,
                init,
                |acc| {
                    ExtensionEvent::BeforeAgentStart(BeforeAgentStartEvent {
                        system_prompt: acc.system_prompt.clone(),
                        ..event.clone()
                    })
                },
                |mut acc, reply, _| {
                    if let HandlerReply::BeforeAgentStart(reply) = reply {
                        if let Some(prompt) = reply.system_prompt {
                            acc.system_prompt = prompt;
                        }
                        acc.messages.extend(reply.message);
                    }
                    Step::Next(acc)
                },
            )
            .await
    }

    /// Transforms chain; the first handler to claim the input stops the
    /// chain.
    pub async fn emit_input(&self, event: InputEvent) -> InputOutcome {
        self.dispatcher
            .dispatch(
                ExtensionEventType::Input,
                &self.context,
                InputOutcome::Continue,
                |acc| match acc {
                    InputOutcome::Transformed { text, images } => ExtensionEvent::Input(InputEvent {
                        text: text.clone(),
                        images: images.clone(),
                        source: event.source.clone(),
                    }),
                    _ => ExtensionEvent::Input(event.clone()),
                },
                |acc, reply, path| match reply {
                    HandlerReply::Input(InputReply::Transform { text, images }) => {
                        let images = images.unwrap_or_else(|| match &acc {
                            InputOutcome::Transformed { images, .. } => images.clone(),
                            _ => event.images.clone(),
                        });
                        Step::Next(InputOutcome::Transformed { text, images })
                    },
                    HandlerReply::Input(InputReply::Handled) => Step::Stop(InputOutcome::Handled {
                        extension_path: path.to_string(),
                    }),
                    _ => Step::Next(acc),
                },
            )
            .await
    }

    /// Deliver a `session_before_*` event. Returns `true` if a handler
    /// cancelled the operation.
    pub async fn emit_session_before(&self, event: ExtensionEvent) -> bool {
        let event_type = event.event_type();
        if !event_type.is_cancellable() {
            self.emit(event).await;
            return false;
        }
        self.dispatcher
            .dispatch(
                event_type,
                &self.context,
                false,
                |_| event.clone(),
                |acc, reply, _| match reply {
                    HandlerReply::Cancel => Step::Stop(true),
                    _ => Step::Next(acc),
                },
            )
            .await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            api::ExtensionApi,
            capabilities::{FlagDefinition, ToolDefinition, command_handler, event_handler},
            testing::{EchoTool, PlainRenderer, RecordingRegistry, StubActions, StubContext},
            types::{ContentBlock, ProviderConfig},
        },
        serde_json::json,
    };

    fn runner(extensions: Vec<Extension>, runtime: Arc<ExtensionRuntime>) -> ExtensionRunner {
        ExtensionRunner::new(
            extensions,
            runtime,
            Arc::new(RecordingRegistry::default()),
            "/work",
        )
    }

    #[tokio::test]
    async fn input_transform_then_handled() {
        let runtime = Arc::new(ExtensionRuntime::new());
        let mut upper = ExtensionApi::new("upper.ts", Arc::clone(&runtime));
        upper.on(
            ExtensionEventType::Input,
            event_handler(|event, _| async move {
                let ExtensionEvent::Input(input) = event else {
                    return Ok(HandlerReply::Continue);
                };
                Ok(HandlerReply::Input(InputReply::Transform {
                    text: input.text.to_uppercase(),
                    images: None,
                }))
            }),
        );
        let mut claim = ExtensionApi::new("claim.ts", Arc::clone(&runtime));
        claim.on(
            ExtensionEventType::Input,
            event_handler(|event, _| async move {
                match event {
                    ExtensionEvent::Input(input) if input.text == "!STOP" => {
                        Ok(HandlerReply::Input(InputReply::Handled))
                    },
                    _ => Ok(HandlerReply::Continue),
                }
            }),
        );
        let runner = runner(vec![upper.finish(), claim.finish()], runtime);

        let event = |text: &str| InputEvent {
            text: text.into(),
            images: vec![],
            source: "interactive".into(),
        };
        assert_eq!(
            runner.emit_input(event("hello")).await,
            InputOutcome::Transformed {
                text: "HELLO".into(),
                images: vec![]
            }
        );
        assert_eq!(
            runner.emit_input(event("!stop")).await,
            InputOutcome::Handled {
                extension_path: "claim.ts".into()
            }
        );
    }

    #[tokio::test]
    async fn tool_call_block_short_circuits() {
        let runtime = Arc::new(ExtensionRuntime::new());
        let mut guard = ExtensionApi::new("guard.ts", Arc::clone(&runtime));
        guard.on(
            ExtensionEventType::ToolCall,
            event_handler(|event, _| async move {
                match event {
                    ExtensionEvent::ToolCall(call) if call.tool_name == "bash" => {
                        Ok(HandlerReply::BlockToolCall {
                            reason: Some("no shell".into()),
                        })
                    },
                    _ => Ok(HandlerReply::Continue),
                }
            }),
        );
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        let mut after = ExtensionApi::new("after.ts", Arc::clone(&runtime));
        after.on(
            ExtensionEventType::ToolCall,
            event_handler(move |_, _| {
                *flag.lock().unwrap() = true;
                async { Ok(HandlerReply::Continue) }
            }),
        );
        let runner = runner(vec![guard.finish(), after.finish()], runtime);

        let block = runner
            .emit_tool_call(ToolCallEvent {
                tool_name: "bash".into(),
                tool_call_id: "c1".into(),
                input: json!({"command": "ls"}),
            })
            .await
            .unwrap();
        assert_eq!(block.extension_path, "guard.ts");
        assert_eq!(block.reason.as_deref(), Some("no shell"));
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn before_agent_start_chains_prompt_and_collects_messages() {
        let runtime = Arc::new(ExtensionRuntime::new());
        let mut exts = Vec::new();
        for name in ["a", "b"] {
            let mut api = ExtensionApi::new(format!("{name}.ts"), Arc::clone(&runtime));
            api.on(
                ExtensionEventType::BeforeAgentStart,
                event_handler(move |event, _| async move {
                    let ExtensionEvent::BeforeAgentStart(start) = event else {
                        return Ok(HandlerReply::Continue);
                    };
                    Ok(HandlerReply::BeforeAgentStart(
                        crate::events::BeforeAgentStartReply {
                            message: Some(CustomMessage::text("note", name)),
                            system_prompt: Some(format!("{} +{name}", start.system_prompt)),
                        },
                    ))
                }),
            );
            exts.push(api.finish());
        }
        let runner = runner(exts, runtime);
        let outcome = runner
            .emit_before_agent_start(BeforeAgentStartEvent {
                prompt: "hi".into(),
                images: vec![],
                system_prompt: "base".into(),
            })
            .await;
        assert_eq!(outcome.system_prompt, "base +a +b");
        assert_eq!(outcome.messages.len(), 2);
    }

    #[tokio::test]
    async fn context_replacement_chains() {
        let runtime = Arc::new(ExtensionRuntime::new());
        let mut api = ExtensionApi::new("trim.ts", Arc::clone(&runtime));
        api.on(
            ExtensionEventType::Context,
            event_handler(|event, _| async move {
                let ExtensionEvent::Context(ctx) = event else {
                    return Ok(HandlerReply::Continue);
                };
                Ok(HandlerReply::ReplaceMessages(
                    ctx.messages.into_iter().skip(1).collect(),
                ))
            }),
        );
        let runner = runner(vec![api.finish()], runtime);
        let out = runner
            .emit_context(vec![json!("old"), json!("new")])
            .await;
        assert_eq!(out, vec![json!("new")]);
    }

    #[tokio::test]
    async fn session_before_cancel() {
        let runtime = Arc::new(ExtensionRuntime::new());
        let mut api = ExtensionApi::new("keep.ts", Arc::clone(&runtime));
        api.on(
            ExtensionEventType::SessionBeforeCompact,
            event_handler(|_, _| async { Ok(HandlerReply::Cancel) }),
        );
        let runner = runner(vec![api.finish()], runtime);
        assert!(
            runner
                .emit_session_before(ExtensionEvent::SessionBeforeCompact { message_count: 40 })
                .await
        );
        assert!(
            !runner
                .emit_session_before(ExtensionEvent::SessionBeforeFork {
                    entry_id: "e1".into()
                })
                .await
        );
    }

    #[tokio::test]
    async fn commands_run_and_report_failures() {
        let runtime = Arc::new(ExtensionRuntime::new());
        let mut api = ExtensionApi::new("cmd.ts", Arc::clone(&runtime));
        api.register_command("fail", None, command_handler(|args, _| async move {
            Err(anyhow::anyhow!("bad args: {args}"))
        }));
        let runner = runner(vec![api.finish()], runtime);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        runner.on_error(Arc::new(move |e: &ExtensionError| {
            sink.lock().unwrap().push(e.clone());
        }));

        assert!(!runner.run_command("missing", "").await);
        assert!(runner.run_command("/fail", "  x y ").await);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event, "command:fail");
        assert!(seen[0].error.contains("bad args: x y"));
    }

    #[tokio::test]
    async fn tools_execute_with_context() {
        let runtime = Arc::new(ExtensionRuntime::new());
        let mut api = ExtensionApi::new("tools.ts", Arc::clone(&runtime));
        api.register_tool(ToolDefinition {
            name: "echo".into(),
            label: "Echo".into(),
            description: "echo params".into(),
            parameters: json!({"type": "object"}),
            executor: Arc::new(EchoTool),
        });
        let runner = runner(vec![api.finish()], runtime);

        let output = runner
            .execute_tool("echo", "c1", json!({"x": 1}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(output.content, vec![ContentBlock::text(r#"c1 {"x":1}"#)]);
        assert!(runner.execute_tool("nope", "c2", json!({})).await.is_none());
    }

    #[test]
    fn flags_and_renderers() {
        let runtime = Arc::new(ExtensionRuntime::new());
        let mut api = ExtensionApi::new("flags.ts", Arc::clone(&runtime));
        api.register_flag(FlagDefinition::boolean("plan", Some(false)));
        api.register_message_renderer("status", Arc::new(PlainRenderer));
        let runner = runner(vec![api.finish()], runtime);

        let values = BTreeMap::from([
            ("plan".to_string(), Value::Bool(true)),
            ("unknown".to_string(), Value::Bool(true)),
        ]);
        assert_eq!(runner.apply_flag_values(&values), 1);
        assert_eq!(runner.flag_values().get("plan"), Some(&Value::Bool(true)));
        assert!(!runner.flag_values().contains_key("unknown"));
        assert_eq!(runner.flags().len(), 1);

        let lines = runner
            .render_message(&CustomMessage::text("status", "ok"), false)
            .unwrap();
        assert_eq!(lines, vec!["ok".to_string()]);
        assert!(
            runner
                .render_message(&CustomMessage::text("other", "ok"), false)
                .is_none()
        );
    }

    #[test]
    fn bind_core_flushes_and_rejects_rebind() {
        let runtime = Arc::new(ExtensionRuntime::new());
        let api = ExtensionApi::new("prov.ts", Arc::clone(&runtime));
        api.register_provider("local", ProviderConfig::default())
            .unwrap();
        let registry = Arc::new(RecordingRegistry::default());
        let runner = ExtensionRunner::new(
            vec![api.finish()],
            Arc::clone(&runtime),
            registry.clone(),
            "/work",
        )
        .with_ui(true);
        assert!(runner.context().has_ui());

        let report = runner
            .bind_core(Arc::new(StubActions::default()), Arc::new(StubContext::default()))
            .unwrap();
        assert_eq!(report.registered, 1);
        assert!(registry.has_provider("local"));
        assert!(matches!(
            runner.bind_core(Arc::new(StubActions::default()), Arc::new(StubContext::default())),
            Err(Error::AlreadyBound)
        ));
    }
}
