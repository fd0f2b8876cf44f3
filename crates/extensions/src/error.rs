use pion_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Chord(#[from] pion_common::Error),

    /// A host capability was requested while extensions are still loading.
    #[error("{action} is unavailable until the host binds the extension runtime")]
    NotBound { action: &'static str },

    #[error("extension runtime is already bound")]
    AlreadyBound,

    #[error("model registry rejected provider '{provider}': {message}")]
    ModelRegistry { provider: String, message: String },

    #[error("tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn not_bound(action: &'static str) -> Self {
        Self::NotBound { action }
    }

    #[must_use]
    pub fn model_registry(provider: impl Into<String>, source: &anyhow::Error) -> Self {
        Self::ModelRegistry {
            provider: provider.into(),
            message: format!("{source:#}"),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pion_common::impl_context!();
