/// Result alias that carries the custom [`SynthSessionError`] type.
pub type Result<T> = std::result::Result<T, SynthSessionError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SynthSessionError {
    /// The platform refused to hand out an audio context or one of its nodes
    /// (missing permission, exhausted hardware, ...). Never retried
    /// automatically.
    #[error("audio resources unavailable: {0}")]
    ResourceUnavailable(String),
    /// A buffer voice was requested before a buffer factory was supplied.
    #[error("no buffer factory available")]
    MissingBackendFactory,
    /// A voice was triggered while no audio session is live.
    #[error("audio session is not active")]
    NotActive,
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Settings or configuration files that are not valid JSON.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl SynthSessionError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a [`SynthSessionError::ResourceUnavailable`] from any message.
    pub fn unavailable<T: Into<String>>(reason: T) -> Self {
        Self::ResourceUnavailable(reason.into())
    }
}

impl From<&str> for SynthSessionError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SynthSessionError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
