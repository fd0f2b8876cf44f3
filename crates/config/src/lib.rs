//! Host configuration for the extension runtime.
//!
//! Config files: `pion.toml`, `pion.yaml`, or `pion.json`, searched in `./`
//! then the user config directory (`~/.config/pion/` on Linux).
//!
//! The config carries the user's keybinding overrides, the reserved action and
//! command sets extensions may not override, and initial flag values.

pub mod error;
pub mod keybindings;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    keybindings::{HostBindings, KeybindingTable, KeybindingWarning},
    loader::{config_dir, discover_and_load, load_config},
    schema::{ChordList, ExtensionsConfig, KeybindingsConfig, PionConfig},
};
