//! Built-in action catalog, default chords and the host binding tables that
//! extensions are checked against.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use {pion_common::KeyChord, tracing::warn};

use crate::schema::{KeybindingsConfig, PionConfig};

/// Default chords for every built-in action.
///
/// Some chords are deliberately shared (`ctrl+c` copies, clears the editor and
/// cancels pickers depending on focus).
pub const DEFAULT_BINDINGS: &[(&str, &[&str])] = &[
    // Cursor movement
    ("cursorUp", &["up"]),
    ("cursorDown", &["down"]),
    ("cursorLeft", &["left", "ctrl+b"]),
    ("cursorRight", &["right", "ctrl+f"]),
    ("cursorWordLeft", &["alt+left", "ctrl+left", "alt+b"]),
    ("cursorWordRight", &["alt+right", "ctrl+right", "alt+f"]),
    ("cursorLineStart", &["home", "ctrl+a"]),
    ("cursorLineEnd", &["end", "ctrl+e"]),
    ("pageUp", &["pageup"]),
    ("pageDown", &["pagedown"]),
    // Deletion
    ("deleteCharBackward", &["backspace"]),
    ("deleteCharForward", &["delete"]),
    ("deleteWordBackward", &["ctrl+w", "alt+backspace"]),
    ("deleteWordForward", &["alt+d", "alt+delete"]),
    ("deleteToLineStart", &["ctrl+u"]),
    ("deleteToLineEnd", &["ctrl+k"]),
    // Text input
    ("newLine", &["shift+enter"]),
    ("submit", &["enter"]),
    ("tab", &["tab"]),
    // Kill ring
    ("yank", &["ctrl+y"]),
    ("yankPop", &["alt+y"]),
    ("undo", &["ctrl+-"]),
    // Clipboard
    ("copy", &["ctrl+c"]),
    ("pasteImage", &["ctrl+v"]),
    // Application
    ("interrupt", &["escape"]),
    ("clear", &["ctrl+c"]),
    ("exit", &["ctrl+d"]),
    ("suspend", &["ctrl+z"]),
    ("externalEditor", &["ctrl+g"]),
    // Session
    ("newSession", &[]),
    ("tree", &[]),
    ("fork", &[]),
    // Models and thinking
    ("selectModel", &["ctrl+l"]),
    ("cycleModelForward", &["ctrl+p"]),
    ("cycleModelBackward", &["shift+ctrl+p"]),
    ("cycleThinkingLevel", &["shift+tab"]),
    // Display
    ("expandTools", &["ctrl+o"]),
    ("toggleThinking", &["ctrl+t"]),
    // Message queue
    ("followUp", &["alt+enter"]),
    ("dequeue", &["alt+up"]),
    // Lists and pickers
    ("selectUp", &["up"]),
    ("selectDown", &["down"]),
    ("selectPageUp", &["pageup"]),
    ("selectPageDown", &["pagedown"]),
    ("selectConfirm", &["enter"]),
    ("selectCancel", &["escape", "ctrl+c"]),
];

/// Actions the host cannot work without; extensions may never take their
/// chords, wherever the user has bound them.
pub const DEFAULT_RESERVED_ACTIONS: &[&str] = &[
    "interrupt",
    "clear",
    "exit",
    "suspend",
    "cycleThinkingLevel",
    "cycleModelForward",
    "cycleModelBackward",
    "selectModel",
    "expandTools",
    "toggleThinking",
    "externalEditor",
    "followUp",
    "submit",
    "selectConfirm",
    "selectCancel",
    "copy",
    "deleteToLineEnd",
];

/// Slash commands implemented by the host itself.
pub const DEFAULT_RESERVED_COMMANDS: &[&str] = &[
    "settings",
    "model",
    "export",
    "share",
    "copy",
    "name",
    "session",
    "changelog",
    "hotkeys",
    "fork",
    "tree",
    "login",
    "logout",
    "new",
    "compact",
    "resume",
    "reload",
    "quit",
];

/// Problems found while applying user keybinding overrides. None of them are
/// fatal: the offending entry is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeybindingWarning {
    UnknownAction {
        action: String,
    },
    InvalidKey {
        action: String,
        key: String,
        error: String,
    },
}

impl fmt::Display for KeybindingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAction { action } => {
                write!(f, "unknown action '{action}' in keybindings (ignored)")
            },
            Self::InvalidKey { action, key, error } => {
                write!(f, "invalid key '{key}' for action '{action}': {error}")
            },
        }
    }
}

/// Built-in action id → the chords currently bound to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeybindingTable {
    bindings: BTreeMap<String, Vec<KeyChord>>,
}

impl KeybindingTable {
    /// An empty table (no built-in actions at all).
    pub fn new() -> Self {
        Self::default()
    }

    /// The default action catalog.
    pub fn defaults() -> Self {
        let mut table = Self::new();
        for (action, chords) in DEFAULT_BINDINGS {
            let chords = chords
                .iter()
                .filter_map(|c| KeyChord::parse(c).ok())
                .collect();
            table.bindings.insert((*action).to_string(), chords);
        }
        table
    }

    /// Defaults with the user's overrides applied.
    pub fn from_config(config: &KeybindingsConfig) -> (Self, Vec<KeybindingWarning>) {
        let mut table = Self::defaults();
        let mut warnings = Vec::new();

        for (action, chords) in &config.bindings {
            if !table.bindings.contains_key(action) {
                warnings.push(KeybindingWarning::UnknownAction {
                    action: action.clone(),
                });
                continue;
            }
            let mut parsed = Vec::new();
            for key in chords.as_slice() {
                match KeyChord::parse(key) {
                    Ok(chord) => parsed.push(chord),
                    Err(e) => warnings.push(KeybindingWarning::InvalidKey {
                        action: action.clone(),
                        key: key.clone(),
                        error: e.to_string(),
                    }),
                }
            }
            table.bindings.insert(action.clone(), parsed);
        }

        for warning in &warnings {
            warn!(%warning, "keybinding override skipped");
        }
        (table, warnings)
    }

    /// Replace the chords of one action, as when the user remaps a key while
    /// the host is running. Unknown actions are added.
    pub fn rebind(&mut self, action: impl Into<String>, chords: Vec<KeyChord>) {
        self.bindings.insert(action.into(), chords);
    }

    pub fn chords(&self, action: &str) -> Option<&[KeyChord]> {
        self.bindings.get(action).map(Vec::as_slice)
    }

    pub fn contains_action(&self, action: &str) -> bool {
        self.bindings.contains_key(action)
    }

    /// Every action and its chords, ordered by action id.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[KeyChord])> {
        self.bindings
            .iter()
            .map(|(action, chords)| (action.as_str(), chords.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Everything the extension runtime needs from the host when resolving
/// shortcuts and commands.
#[derive(Debug, Clone)]
pub struct HostBindings {
    pub keybindings: KeybindingTable,
    pub reserved_actions: BTreeSet<String>,
    pub reserved_commands: BTreeSet<String>,
    pub warnings: Vec<KeybindingWarning>,
}

impl HostBindings {
    pub fn from_config(config: &PionConfig) -> Self {
        let (keybindings, warnings) = KeybindingTable::from_config(&config.keybindings);
        let reserved_actions = match &config.keybindings.reserved_actions {
            Some(actions) => actions.iter().cloned().collect(),
            None => DEFAULT_RESERVED_ACTIONS
                .iter()
                .map(|a| (*a).to_string())
                .collect(),
        };
        let reserved_commands = match &config.extensions.reserved_commands {
            Some(commands) => commands.iter().cloned().collect(),
            None => DEFAULT_RESERVED_COMMANDS
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
        };
        Self {
            keybindings,
            reserved_actions,
            reserved_commands,
            warnings,
        }
    }
}

impl Default for HostBindings {
    fn default() -> Self {
        Self::from_config(&PionConfig::default())
    }
}
