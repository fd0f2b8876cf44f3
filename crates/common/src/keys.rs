//! Key chord normalization.
//!
//! A chord is written as `+`-separated parts, modifiers first and the key
//! last: `ctrl+shift+k`. Normalization lowercases every part, resolves
//! modifier aliases and sorts modifiers into a canonical order, so the same
//! physical chord always compares equal regardless of how it was spelled.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MODIFIER_ORDER: &[&str] = &["ctrl", "alt", "shift", "super"];

fn canonical_modifier(part: &str) -> Option<&'static str> {
    match part {
        "ctrl" | "control" => Some("ctrl"),
        "alt" | "option" | "opt" => Some("alt"),
        "shift" => Some("shift"),
        "super" | "cmd" | "command" | "win" => Some("super"),
        _ => None,
    }
}

/// Normalize a chord string into its canonical lowercase form.
///
/// `"Shift+Ctrl+K"` and `"ctrl+shift+k"` both normalize to `"ctrl+shift+k"`.
/// A lone `+` is accepted as the plus key.
pub fn normalize_chord(raw: &str) -> Result<String> {
    let lowered = raw.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return Err(Error::invalid_chord(raw, "empty chord"));
    }
    if lowered == "+" {
        return Ok(lowered);
    }

    // `ctrl++` means ctrl and the plus key.
    let (body, plus_key) = match lowered.strip_suffix("++") {
        Some(rest) => (rest.to_string(), true),
        None => (lowered.clone(), false),
    };

    let mut parts: Vec<&str> = body.split('+').map(str::trim).collect();
    let key = if plus_key {
        "+".to_string()
    } else {
        match parts.pop() {
            Some(k) if !k.is_empty() => k.to_string(),
            _ => return Err(Error::invalid_chord(raw, "missing key after modifier")),
        }
    };
    if canonical_modifier(&key).is_some() {
        return Err(Error::invalid_chord(raw, "chord ends with a modifier"));
    }

    let mut modifiers: Vec<&'static str> = Vec::with_capacity(parts.len());
    for part in parts {
        if part.is_empty() {
            return Err(Error::invalid_chord(raw, "empty chord segment"));
        }
        let Some(modifier) = canonical_modifier(part) else {
            return Err(Error::invalid_chord(raw, format!("unknown modifier '{part}'")));
        };
        if !modifiers.contains(&modifier) {
            modifiers.push(modifier);
        }
    }
    modifiers.sort_by_key(|m| MODIFIER_ORDER.iter().position(|o| o == m));

    let mut out = modifiers.join("+");
    if !out.is_empty() {
        out.push('+');
    }
    out.push_str(&key);
    Ok(out)
}

/// A normalized key chord.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyChord(String);

impl KeyChord {
    pub fn parse(raw: &str) -> Result<Self> {
        normalize_chord(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KeyChord {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<KeyChord> for String {
    fn from(chord: KeyChord) -> Self {
        chord.0
    }
}

impl Borrow<str> for KeyChord {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("ctrl+c", "ctrl+c")]
    #[case("Ctrl+C", "ctrl+c")]
    #[case("  CTRL+K ", "ctrl+k")]
    #[case("shift+ctrl+k", "ctrl+shift+k")]
    #[case("Control+Option+x", "ctrl+alt+x")]
    #[case("cmd+shift+p", "shift+super+p")]
    #[case("escape", "escape")]
    #[case("ctrl++", "ctrl++")]
    #[case("+", "+")]
    #[case("ctrl+ctrl+a", "ctrl+a")]
    fn normalizes(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_chord(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("ctrl+")]
    #[case("ctrl+shift")]
    #[case("hyper+k")]
    #[case("ctrl++k")]
    fn rejects(#[case] raw: &str) {
        assert!(normalize_chord(raw).is_err());
    }

    #[test]
    fn chord_deserializes_normalized() {
        let chord: KeyChord = serde_json::from_str("\"Alt+Enter\"").unwrap();
        assert_eq!(chord.as_str(), "alt+enter");
        assert!(serde_json::from_str::<KeyChord>("\"alt+\"").is_err());
    }
}
