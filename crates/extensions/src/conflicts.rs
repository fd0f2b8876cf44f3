//! Resolution of extension shortcuts and commands against the host's
//! built-in tables.
//!
//! Both resolvers are pure functions of the loaded extensions and the tables
//! passed in. Nothing is cached: the host may remap keys or change its
//! reserved command set between calls, and the next call sees the change.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, btree_map::Entry},
    fmt,
};

use {
    pion_common::KeyChord,
    pion_config::KeybindingTable,
    tracing::warn,
};

use crate::{
    api::Extension,
    capabilities::{CommandRegistration, ShortcutRegistration},
};

// ── Shortcuts ───────────────────────────────────────────────────────────────

/// Why an extension shortcut produced a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutConflict {
    /// The chord belongs to a reserved built-in action. The shortcut was
    /// dropped.
    ReservedBuiltin { actions: Vec<String> },
    /// The chord belongs to an overridable built-in action. The extension
    /// handler replaced it.
    BuiltinOverride { action: String },
    /// An earlier extension registered the same chord. The later one won.
    ExtensionConflict { previous_extension: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutWarning {
    pub extension_path: String,
    pub chord: KeyChord,
    pub kind: ShortcutConflict,
}

impl ShortcutWarning {
    /// Whether the shortcut made it into the effective table.
    pub fn accepted(&self) -> bool {
        !matches!(self.kind, ShortcutConflict::ReservedBuiltin { .. })
    }
}

impl fmt::Display for ShortcutWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = &self.extension_path;
        let chord = &self.chord;
        match &self.kind {
            ShortcutConflict::ReservedBuiltin { .. } => write!(
                f,
                "Extension shortcut '{chord}' from {path} conflicts with built-in shortcut. Skipping."
            ),
            ShortcutConflict::BuiltinOverride { action } => write!(
                f,
                "Extension shortcut conflict: '{chord}' is built-in shortcut for {action} and {path} overrides it."
            ),
            ShortcutConflict::ExtensionConflict { previous_extension } => write!(
                f,
                "Extension shortcut conflict: '{chord}' registered by both {previous_extension} and {path}. Using {path}."
            ),
        }
    }
}

/// The effective shortcut table plus the warnings produced building it.
#[derive(Debug, Clone, Default)]
pub struct ShortcutResolution {
    pub shortcuts: BTreeMap<KeyChord, ShortcutRegistration>,
    pub warnings: Vec<ShortcutWarning>,
}

impl ShortcutResolution {
    pub fn get(&self, chord: &str) -> Option<&ShortcutRegistration> {
        self.shortcuts.get(chord)
    }
}

/// Map every chord currently bound in `keybindings` to the actions using it.
fn key_to_actions(keybindings: &KeybindingTable) -> HashMap<&KeyChord, Vec<&str>> {
    let mut map: HashMap<&KeyChord, Vec<&str>> = HashMap::new();
    for (action, chords) in keybindings.iter() {
        for chord in chords {
            map.entry(chord).or_default().push(action);
        }
    }
    map
}

/// Build the effective shortcut table.
///
/// Extensions are visited in load order. A chord bound to any reserved action
/// is rejected. A chord bound only to overridable actions is accepted with a
/// warning. A chord claimed by an earlier extension is taken over by the later
/// one, with a warning. Everything else is accepted silently.
pub fn resolve_shortcuts(
    extensions: &[Extension],
    keybindings: &KeybindingTable,
    reserved_actions: &BTreeSet<String>,
) -> ShortcutResolution {
    let builtin = key_to_actions(keybindings);
    let mut resolution = ShortcutResolution::default();

    for extension in extensions {
        for shortcut in extension.shortcuts() {
            let chord = &shortcut.chord;

            if let Some(actions) = builtin.get(chord) {
                let reserved: Vec<String> = actions
                    .iter()
                    .filter(|a| reserved_actions.contains(**a))
                    .map(|a| (*a).to_string())
                    .collect();
                if !reserved.is_empty() {
                    resolution.warnings.push(ShortcutWarning {
                        extension_path: extension.path().to_string(),
                        chord: chord.clone(),
                        kind: ShortcutConflict::ReservedBuiltin { actions: reserved },
                    });
                    continue;
                }
                resolution.warnings.push(ShortcutWarning {
                    extension_path: extension.path().to_string(),
                    chord: chord.clone(),
                    kind: ShortcutConflict::BuiltinOverride {
                        action: actions.join(", "),
                    },
                });
            }

            match resolution.shortcuts.entry(chord.clone()) {
                Entry::Occupied(mut slot) => {
                    let previous = slot.insert(shortcut.clone());
                    if !builtin.contains_key(chord) {
                        resolution.warnings.push(ShortcutWarning {
                            extension_path: extension.path().to_string(),
                            chord: chord.clone(),
                            kind: ShortcutConflict::ExtensionConflict {
                                previous_extension: previous.extension_path,
                            },
                        });
                    }
                },
                Entry::Vacant(slot) => {
                    slot.insert(shortcut.clone());
                },
            }
        }
    }

    for warning in &resolution.warnings {
        warn!(
            extension = %warning.extension_path,
            chord = %warning.chord,
            "{warning}"
        );
    }
    resolution
}

// ── Commands ────────────────────────────────────────────────────────────────

/// A registration excluded from an effective table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub extension_path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CommandResolution {
    pub commands: Vec<CommandRegistration>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Build the effective command list, excluding names the host reserves.
///
/// Cross-extension duplicates were already settled at registration time; a
/// duplicate that slips through here (extensions loaded against separate
/// runtimes) keeps the first one.
pub fn resolve_commands(
    extensions: &[Extension],
    reserved_commands: &BTreeSet<String>,
) -> CommandResolution {
    let mut resolution = CommandResolution::default();
    let mut seen = BTreeSet::new();

    for extension in extensions {
        for command in extension.commands() {
            if reserved_commands.contains(&command.name) {
                let reason = format!(
                    "Extension command '/{}' from {} conflicts with built-in command. Skipping.",
                    command.name,
                    extension.path()
                );
                warn!(extension = %extension.path(), command = %command.name, "{reason}");
                resolution.diagnostics.push(Diagnostic {
                    extension_path: extension.path().to_string(),
                    reason,
                });
                continue;
            }
            if seen.insert(command.name.clone()) {
                resolution.commands.push(command.clone());
            }
        }
    }
    resolution
}
