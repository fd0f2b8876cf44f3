//! Shared error definitions and key-chord utilities used across all pion crates.

pub mod error;
pub mod keys;

pub use {
    error::{Error, FromMessage, Result},
    keys::{KeyChord, normalize_chord},
};
