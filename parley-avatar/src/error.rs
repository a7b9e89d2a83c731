//! Error types for parley-avatar

use parley_core::Error as CoreError;
use thiserror::Error;

/// Avatar session errors
#[derive(Error, Debug)]
pub enum AvatarError {
    /// Transport failure reaching the provider; safe to retry
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The provider answered with a non-success status
    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    /// The provider reported that a render job failed
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Media transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl AvatarError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AvatarError::ProviderUnavailable(_))
    }
}

impl From<AvatarError> for CoreError {
    fn from(err: AvatarError) -> Self {
        CoreError::Avatar(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AvatarError>;
