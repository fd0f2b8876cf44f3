use thiserror::Error;

/// Errors shared by the pion crates that do not need their own error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    /// A key chord string that cannot be normalized (empty, dangling `+`,
    /// modifier without a key).
    #[error("invalid key chord '{chord}': {reason}")]
    InvalidChord { chord: String, reason: String },
}

impl Error {
    #[must_use]
    pub fn invalid_chord(chord: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidChord {
            chord: chord.into(),
            reason: reason.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Context helpers ─────────────────────────────────────────────────────────

/// Error types that can be built from a bare message.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Declares a crate-local `Context` trait for `Result` and `Option`, producing
/// the calling module's `Error` through [`FromMessage`].
///
/// ```ignore
/// pion_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        /// Attach a message to a failed `Result` or an empty `Option`.
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let context = context.into();
                self.with_context(|| context)
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.map_err(|e| $crate::FromMessage::from_message(format!("{}: {e}", f().into())))
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let context = context.into();
                self.with_context(|| context)
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.ok_or_else(|| $crate::FromMessage::from_message(f().into()))
            }
        }
    };
}
