//! Clip backend: every utterance is rendered as a finished video clip
//! and polled until the provider reports it done.

use crate::backend::{AvatarBackend, Utterance};
use crate::client::AvatarServiceClient;
use crate::engine::NegotiationState;
use crate::error::{AvatarError, Result};
use crate::poller::StatusPoller;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct ClipBackend {
    client: Arc<dyn AvatarServiceClient>,
    poller: StatusPoller,
    state: NegotiationState,
    cancel: CancellationToken,
}

impl ClipBackend {
    pub fn new(client: Arc<dyn AvatarServiceClient>, poller: StatusPoller) -> Self {
        Self {
            client,
            poller,
            state: NegotiationState::Idle,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops any poll in progress; fired by `shutdown`
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[async_trait]
impl AvatarBackend for ClipBackend {
    fn backend_name(&self) -> &'static str {
        "clip"
    }

    fn state(&self) -> NegotiationState {
        self.state
    }

    async fn prepare(&mut self) -> Result<()> {
        match self.state {
            NegotiationState::Closed => Err(AvatarError::SessionClosed),
            NegotiationState::Speaking => Err(AvatarError::InvalidSessionState(
                "a clip is still playing".to_string(),
            )),
            _ => {
                self.state = NegotiationState::Ready;
                Ok(())
            }
        }
    }

    async fn speak(&mut self, text: &str) -> Result<Utterance> {
        match self.state {
            NegotiationState::Closed => return Err(AvatarError::SessionClosed),
            NegotiationState::Ready => {}
            other => {
                return Err(AvatarError::InvalidSessionState(format!(
                    "speak requires Ready, backend is {}",
                    other
                )))
            }
        }
        if text.trim().is_empty() {
            return Err(AvatarError::InvalidPrompt("text must not be empty".to_string()));
        }

        self.state = NegotiationState::Speaking;
        let rendered = async {
            let job_id = self.client.submit_render_job(text).await?;
            info!(job_id = %job_id, "render job submitted");
            let url = self.poller.poll(&job_id, &self.cancel).await?;
            Ok::<_, AvatarError>(Utterance::Clip { job_id, url })
        }
        .await;

        if rendered.is_err() {
            self.state = if self.cancel.is_cancelled() {
                NegotiationState::Closed
            } else {
                NegotiationState::Ready
            };
        }
        rendered
    }

    fn finish_utterance(&mut self) -> Result<()> {
        match self.state {
            NegotiationState::Speaking => {
                self.state = NegotiationState::Ready;
                Ok(())
            }
            NegotiationState::Closed => Err(AvatarError::SessionClosed),
            other => Err(AvatarError::InvalidSessionState(format!(
                "no clip playing, backend is {}",
                other
            ))),
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.state != NegotiationState::Closed {
            self.cancel.cancel();
            self.state = NegotiationState::Closed;
            info!("clip backend shut down");
        } else {
            warn!("clip backend already shut down");
        }
        Ok(())
    }
}
