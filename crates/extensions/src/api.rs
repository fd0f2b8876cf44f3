//! The registration surface handed to each extension while it loads.
//!
//! Registrations are recorded on the extension in declaration order. Shortcut
//! and command conflicts with the host are left to query time; name clashes
//! between extensions for tools, commands, flags and renderers are settled
//! here, first registration wins.

use std::sync::Arc;

use {
    pion_common::KeyChord,
    serde_json::Value,
    tracing::{debug, info},
};

use crate::{
    capabilities::{
        CommandHandler, CommandRegistration, EventHandler, FlagDefinition, MessageRenderer,
        RegisteredFlag, RegisteredTool, RendererRegistration, ShortcutHandler,
        ShortcutRegistration, ToolDefinition,
    },
    error::Result,
    events::ExtensionEventType,
    runtime::{CapabilityKind, Claim, ExtensionRuntime},
    types::ProviderConfig,
};

/// One loaded extension and everything it registered.
#[derive(Clone)]
pub struct Extension {
    path: String,
    handlers: Vec<(ExtensionEventType, Arc<dyn EventHandler>)>,
    shortcuts: Vec<ShortcutRegistration>,
    commands: Vec<CommandRegistration>,
    tools: Vec<RegisteredTool>,
    flags: Vec<RegisteredFlag>,
    renderers: Vec<RendererRegistration>,
}

impl Extension {
    fn new(path: String) -> Self {
        Self {
            path,
            handlers: Vec::new(),
            shortcuts: Vec::new(),
            commands: Vec::new(),
            tools: Vec::new(),
            flags: Vec::new(),
            renderers: Vec::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Event handlers in declaration order.
    pub fn handlers(&self) -> &[(ExtensionEventType, Arc<dyn EventHandler>)] {
        &self.handlers
    }

    pub fn shortcuts(&self) -> &[ShortcutRegistration] {
        &self.shortcuts
    }

    pub fn commands(&self) -> &[CommandRegistration] {
        &self.commands
    }

    pub fn tools(&self) -> &[RegisteredTool] {
        &self.tools
    }

    pub fn flags(&self) -> &[RegisteredFlag] {
        &self.flags
    }

    pub fn renderers(&self) -> &[RendererRegistration] {
        &self.renderers
    }
}

/// Replace the entry matching `same`, or append.
fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|existing| same(existing)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

/// Registration API bound to the extension currently loading.
pub struct ExtensionApi {
    extension: Extension,
    runtime: Arc<ExtensionRuntime>,
}

impl ExtensionApi {
    pub fn new(path: impl Into<String>, runtime: Arc<ExtensionRuntime>) -> Self {
        Self {
            extension: Extension::new(path.into()),
            runtime,
        }
    }

    pub fn path(&self) -> &str {
        &self.extension.path
    }

    /// Shared runtime handle, for handlers that need host actions or flags
    /// later on.
    pub fn runtime(&self) -> Arc<ExtensionRuntime> {
        Arc::clone(&self.runtime)
    }

    /// Subscribe to an event type.
    pub fn on(&mut self, event: ExtensionEventType, handler: Arc<dyn EventHandler>) {
        self.extension.handlers.push((event, handler));
    }

    /// Register a key chord. Collisions with built-ins or other extensions are
    /// resolved when the host asks for the effective shortcut table.
    pub fn register_shortcut(
        &mut self,
        chord: &str,
        description: Option<String>,
        handler: Arc<dyn ShortcutHandler>,
    ) -> Result<()> {
        let chord = KeyChord::parse(chord)?;
        let registration = ShortcutRegistration {
            chord: chord.clone(),
            description,
            handler,
            extension_path: self.extension.path.clone(),
        };
        upsert(&mut self.extension.shortcuts, registration, |s| s.chord == chord);
        debug!(extension = %self.extension.path, %chord, "shortcut registered");
        Ok(())
    }

    pub fn register_command(
        &mut self,
        name: &str,
        description: Option<String>,
        handler: Arc<dyn CommandHandler>,
    ) {
        let name = name.trim_start_matches('/');
        if !self.claim(CapabilityKind::Command, name) {
            return;
        }
        let registration = CommandRegistration {
            name: name.to_string(),
            description,
            handler,
            extension_path: self.extension.path.clone(),
        };
        upsert(&mut self.extension.commands, registration, |c| c.name == name);
    }

    pub fn register_tool(&mut self, definition: ToolDefinition) {
        if !self.claim(CapabilityKind::Tool, &definition.name) {
            return;
        }
        let name = definition.name.clone();
        let registration = RegisteredTool {
            definition,
            extension_path: self.extension.path.clone(),
        };
        upsert(&mut self.extension.tools, registration, |t| {
            t.definition.name == name
        });
    }

    /// Register a flag. Its default, if any, overwrites the current value.
    pub fn register_flag(&mut self, definition: FlagDefinition) {
        if !self.claim(CapabilityKind::Flag, &definition.name) {
            return;
        }
        if let Some(default) = &definition.default {
            self.runtime
                .set_flag_value(definition.name.clone(), default.clone());
        }
        let name = definition.name.clone();
        let registration = RegisteredFlag {
            definition,
            extension_path: self.extension.path.clone(),
        };
        upsert(&mut self.extension.flags, registration, |f| {
            f.definition.name == name
        });
    }

    pub fn register_message_renderer(
        &mut self,
        custom_type: &str,
        renderer: Arc<dyn MessageRenderer>,
    ) {
        if !self.claim(CapabilityKind::MessageRenderer, custom_type) {
            return;
        }
        let registration = RendererRegistration {
            custom_type: custom_type.to_string(),
            renderer,
            extension_path: self.extension.path.clone(),
        };
        upsert(&mut self.extension.renderers, registration, |r| {
            r.custom_type == custom_type
        });
    }

    /// Queued until the host binds, immediate afterwards.
    pub fn register_provider(&self, name: &str, config: ProviderConfig) -> Result<()> {
        info!(extension = %self.extension.path, provider = name, "extension registered provider");
        self.runtime.register_provider(name, config)
    }

    pub fn unregister_provider(&self, name: &str) -> Result<()> {
        self.runtime.unregister_provider(name)
    }

    /// Value of a flag this extension registered. Flags owned by other
    /// extensions read as absent.
    pub fn flag(&self, name: &str) -> Option<Value> {
        self.extension
            .flags
            .iter()
            .any(|f| f.definition.name == name)
            .then(|| self.runtime.flag_value(name))
            .flatten()
    }

    /// Finish loading and hand the registrations to the runner.
    pub fn finish(self) -> Extension {
        debug!(
            extension = %self.extension.path,
            handlers = self.extension.handlers.len(),
            shortcuts = self.extension.shortcuts.len(),
            commands = self.extension.commands.len(),
            tools = self.extension.tools.len(),
            flags = self.extension.flags.len(),
            "extension loaded"
        );
        self.extension
    }

    fn claim(&self, kind: CapabilityKind, name: &str) -> bool {
        match self.runtime.claim(kind, name, &self.extension.path) {
            Claim::Granted | Claim::Owned => true,
            Claim::Taken { owner } => {
                debug!(
                    extension = %self.extension.path,
                    ?kind,
                    name,
                    owner = %owner,
                    "name already registered by an earlier extension, ignoring"
                );
                false
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            capabilities::{command_handler, event_handler, shortcut_handler},
            events::HandlerReply,
            testing::{EchoTool, PlainRenderer},
        },
    };

    fn runtime() -> Arc<ExtensionRuntime> {
        Arc::new(ExtensionRuntime::new())
    }

    fn tool(name: &str, description: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            label: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object"}),
            executor: Arc::new(EchoTool),
        }
    }

    #[test]
    fn duplicate_tool_keeps_first_extension() {
        let runtime = runtime();
        let mut first = ExtensionApi::new("first.ts", Arc::clone(&runtime));
        first.register_tool(tool("search", "first"));
        let mut second = ExtensionApi::new("second.ts", Arc::clone(&runtime));
        second.register_tool(tool("search", "second"));
        second.register_tool(tool("fetch", "second"));

        let first = first.finish();
        let second = second.finish();
        assert_eq!(first.tools().len(), 1);
        assert_eq!(first.tools()[0].definition.description, "first");
        assert_eq!(second.tools().len(), 1);
        assert_eq!(second.tools()[0].definition.name, "fetch");
    }

    #[test]
    fn same_extension_reregistration_replaces() {
        let mut api = ExtensionApi::new("a.ts", runtime());
        api.register_tool(tool("search", "v1"));
        api.register_tool(tool("search", "v2"));
        let ext = api.finish();
        assert_eq!(ext.tools().len(), 1);
        assert_eq!(ext.tools()[0].definition.description, "v2");
    }

    #[test]
    fn duplicate_flag_keeps_first_default() {
        let runtime = runtime();
        let mut first = ExtensionApi::new("first.ts", Arc::clone(&runtime));
        first.register_flag(FlagDefinition::boolean("plan", Some(true)));
        let mut second = ExtensionApi::new("second.ts", Arc::clone(&runtime));
        second.register_flag(FlagDefinition::boolean("plan", Some(false)));

        assert_eq!(runtime.flag_value("plan"), Some(Value::Bool(true)));
        assert!(second.finish().flags().is_empty());
        assert_eq!(first.flag("plan"), Some(Value::Bool(true)));
    }

    #[test]
    fn flag_default_overwrites_preset_value() {
        let runtime = runtime();
        runtime.set_flag_value("plan", Value::Bool(false));
        let mut api = ExtensionApi::new("a.ts", Arc::clone(&runtime));
        api.register_flag(FlagDefinition::boolean("plan", Some(true)));
        assert_eq!(api.flag("plan"), Some(Value::Bool(true)));
        assert_eq!(runtime.flag_value("plan"), Some(Value::Bool(true)));
    }

    #[test]
    fn reregistered_flag_takes_new_default() {
        let runtime = runtime();
        let mut api = ExtensionApi::new("a.ts", Arc::clone(&runtime));
        api.register_flag(FlagDefinition::string("mode", Some("fast")));
        api.register_flag(FlagDefinition::string("mode", Some("safe")));
        assert_eq!(api.flag("mode"), Some(Value::from("safe")));

        let ext = api.finish();
        assert_eq!(ext.flags().len(), 1);
        assert_eq!(ext.flags()[0].definition.default, Some(Value::from("safe")));
    }

    #[test]
    fn foreign_flag_reads_absent() {
        let runtime = runtime();
        let mut owner = ExtensionApi::new("owner.ts", Arc::clone(&runtime));
        owner.register_flag(FlagDefinition::string("mode", Some("fast")));
        let other = ExtensionApi::new("other.ts", Arc::clone(&runtime));
        assert_eq!(other.flag("mode"), None);
        assert_eq!(owner.flag("mode"), Some(Value::from("fast")));
    }

    #[test]
    fn duplicate_command_and_renderer_keep_first() {
        let runtime = runtime();
        let mut first = ExtensionApi::new("first.ts", Arc::clone(&runtime));
        first.register_command("deploy", Some("first".into()), command_handler(|_, _| async {
            Ok(())
        }));
        first.register_message_renderer("status", Arc::new(PlainRenderer));
        let mut second = ExtensionApi::new("second.ts", Arc::clone(&runtime));
        second.register_command("/deploy", Some("second".into()), command_handler(|_, _| async {
            Ok(())
        }));
        second.register_message_renderer("status", Arc::new(PlainRenderer));

        let first = first.finish();
        let second = second.finish();
        assert_eq!(first.commands()[0].description.as_deref(), Some("first"));
        assert!(second.commands().is_empty());
        assert_eq!(first.renderers().len(), 1);
        assert!(second.renderers().is_empty());
    }

    #[test]
    fn shortcuts_are_normalized_and_deduplicated_per_extension() {
        let mut api = ExtensionApi::new("a.ts", runtime());
        api.register_shortcut("Ctrl+Shift+K", Some("one".into()), shortcut_handler(|_| async {
            Ok(())
        }))
        .unwrap();
        api.register_shortcut("shift+ctrl+k", Some("two".into()), shortcut_handler(|_| async {
            Ok(())
        }))
        .unwrap();
        assert!(
            api.register_shortcut("ctrl+", None, shortcut_handler(|_| async { Ok(()) }))
                .is_err()
        );

        let ext = api.finish();
        assert_eq!(ext.shortcuts().len(), 1);
        assert_eq!(ext.shortcuts()[0].chord.as_str(), "ctrl+shift+k");
        assert_eq!(ext.shortcuts()[0].description.as_deref(), Some("two"));
    }

    #[test]
    fn handlers_keep_declaration_order() {
        let mut api = ExtensionApi::new("a.ts", runtime());
        api.on(
            ExtensionEventType::ToolResult,
            event_handler(|_, _| async { Ok(HandlerReply::Continue) }),
        );
        api.on(
            ExtensionEventType::AgentStart,
            event_handler(|_, _| async { Ok(HandlerReply::Continue) }),
        );
        let ext = api.finish();
        let types: Vec<_> = ext.handlers().iter().map(|(t, _)| *t).collect();
        assert_eq!(types, vec![
            ExtensionEventType::ToolResult,
            ExtensionEventType::AgentStart
        ]);
    }

    #[test]
    fn provider_registration_goes_through_runtime() {
        let runtime = runtime();
        let api = ExtensionApi::new("a.ts", Arc::clone(&runtime));
        api.register_provider("local", ProviderConfig::default())
            .unwrap();
        api.register_provider("local", ProviderConfig::default())
            .unwrap();
        assert_eq!(runtime.pending_providers().len(), 2);
        api.unregister_provider("local").unwrap();
        assert!(runtime.pending_providers().is_empty());
    }
}
