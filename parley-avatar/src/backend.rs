//! One interface over the two ways of making the avatar talk: a live
//! negotiated stream or a rendered clip.

use crate::engine::NegotiationState;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Result of asking a backend to speak
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Utterance {
    /// Spoken over the live stream
    Streamed {
        task_id: Option<String>,
        duration: Option<Duration>,
    },
    /// Rendered as a finished clip
    Clip { job_id: String, url: String },
}

impl Utterance {
    /// How long the avatar will be talking, when the provider said so
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Utterance::Streamed { duration, .. } => *duration,
            Utterance::Clip { .. } => None,
        }
    }
}

#[async_trait]
pub trait AvatarBackend: Send {
    fn backend_name(&self) -> &'static str;

    fn state(&self) -> NegotiationState;

    /// Identifies the current provider session. A change means anything
    /// sent to the previous session is gone.
    fn generation(&self) -> u64 {
        0
    }

    /// Get ready to speak (negotiate a session, warm up, ...)
    async fn prepare(&mut self) -> Result<()>;

    /// Say `text`. The backend is `Speaking` until `finish_utterance`.
    async fn speak(&mut self, text: &str) -> Result<Utterance>;

    fn finish_utterance(&mut self) -> Result<()>;

    async fn shutdown(&mut self) -> Result<()>;
}
