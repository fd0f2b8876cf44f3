//! Configuration schema for the extension host.

use std::collections::BTreeMap;

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PionConfig {
    pub keybindings: KeybindingsConfig,
    pub extensions: ExtensionsConfig,
}

/// One chord or a list of chords, as users tend to write either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChordList {
    One(String),
    Many(Vec<String>),
}

impl ChordList {
    pub fn as_slice(&self) -> &[String] {
        match self {
            Self::One(chord) => std::slice::from_ref(chord),
            Self::Many(chords) => chords,
        }
    }
}

/// User keybinding customization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeybindingsConfig {
    /// Action id → chords. An entry replaces the default chords of that
    /// action entirely; an empty list unbinds it.
    pub bindings: BTreeMap<String, ChordList>,
    /// Replaces the default reserved action set when present.
    pub reserved_actions: Option<Vec<String>>,
}

/// Extension-related host settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Replaces the default built-in command names when present.
    pub reserved_commands: Option<Vec<String>>,
    /// Initial flag values, applied after extensions have loaded.
    pub flags: BTreeMap<String, Value>,
}
