//! Session Negotiation Engine
//!
//! Owns the one live session with the provider and its state machine:
//!
//! ```text
//! Idle -> Creating -> Negotiating -> Ready <-> Speaking
//!   any non-terminal state -> Failed      any state -> Closed
//! ```
//!
//! Negotiation and speaking are separate steps so the media transport is
//! fully live before any text is dispatched. Observers follow the state
//! through a `watch` channel; only the engine writes to it.

use crate::backend::{AvatarBackend, Utterance};
use crate::client::AvatarServiceClient;
use crate::error::{AvatarError, Result};
use crate::transport::{MediaTransport, TransportFactory};
use crate::wire::{IceServer, SessionDescription, SpeakAck};
use async_trait::async_trait;
use chrono::Utc;
use parley_core::config::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NegotiationState {
    Idle,
    Creating,
    Negotiating,
    Ready,
    Speaking,
    Closed,
    Failed,
}

impl NegotiationState {
    /// A session exists and has not been torn down
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            NegotiationState::Negotiating | NegotiationState::Ready | NegotiationState::Speaking
        )
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What observers see of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: NegotiationState,
    pub session_id: Option<String>,
    /// Increases with every created session
    pub generation: u64,
    pub last_error: Option<String>,
}

struct ActiveSession {
    session_id: String,
    media_descriptor: SessionDescription,
    ice_endpoints: Vec<IceServer>,
    transport: Option<Box<dyn MediaTransport>>,
}

pub struct SessionEngine {
    client: Arc<dyn AvatarServiceClient>,
    transports: Arc<dyn TransportFactory>,
    avatar_id: String,
    voice_id: String,
    first_frame_timeout: Duration,
    state: NegotiationState,
    session: Option<ActiveSession>,
    generation: u64,
    last_error: Option<String>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionEngine {
    pub fn new(
        client: Arc<dyn AvatarServiceClient>,
        transports: Arc<dyn TransportFactory>,
        provider: &ProviderConfig,
    ) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot {
            state: NegotiationState::Idle,
            session_id: None,
            generation: 0,
            last_error: None,
        });
        Self {
            client,
            transports,
            avatar_id: provider.avatar_id.clone(),
            voice_id: provider.voice_id.clone(),
            first_frame_timeout: provider.first_frame_timeout(),
            state: NegotiationState::Idle,
            session: None,
            generation: 0,
            last_error: None,
            snapshot,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn media_descriptor(&self) -> Option<&SessionDescription> {
        self.session.as_ref().map(|s| &s.media_descriptor)
    }

    pub fn ice_endpoints(&self) -> &[IceServer] {
        self.session
            .as_ref()
            .map(|s| s.ice_endpoints.as_slice())
            .unwrap_or(&[])
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn set_state(&mut self, state: NegotiationState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, session_id = ?self.session_id(), "state change");
        }
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot {
            state: self.state,
            session_id: self.session_id().map(str::to_string),
            generation: self.generation,
            last_error: self.last_error.clone(),
        };
        self.snapshot.send_replace(snapshot);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == NegotiationState::Closed {
            return Err(AvatarError::SessionClosed);
        }
        Ok(())
    }

    fn expect_state(&self, expected: NegotiationState, operation: &str) -> Result<()> {
        self.ensure_open()?;
        if self.state != expected {
            return Err(AvatarError::InvalidSessionState(format!(
                "{} requires {}, engine is {}",
                operation, expected, self.state
            )));
        }
        Ok(())
    }

    fn log_failure(&self, operation: &str, err: &AvatarError) {
        error!(
            operation,
            session_id = ?self.session_id(),
            generation = self.generation,
            at = %Utc::now().to_rfc3339(),
            error = %err,
            "avatar session operation failed"
        );
    }

    /// Log, record and move to `Failed`. The transport is released but the
    /// provider session is left for the next `start` or `close` to tear down.
    async fn fail(&mut self, operation: &str, err: AvatarError) -> AvatarError {
        self.log_failure(operation, &err);
        if let Some(session) = self.session.as_mut() {
            if let Some(mut transport) = session.transport.take() {
                transport.close().await;
            }
        }
        self.last_error = Some(err.to_string());
        self.set_state(NegotiationState::Failed);
        err
    }

    /// Close the transport and the provider session, if any
    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Some(mut transport) = session.transport.take() {
                transport.close().await;
            }
            self.client.close_session(&session.session_id).await;
            info!(session_id = %session.session_id, generation = self.generation, "session torn down");
        }
    }

    /// Create a new provider session. Any previous session is torn down
    /// first and can no longer speak.
    pub async fn start(&mut self, avatar_id: &str, voice_id: &str) -> Result<()> {
        self.ensure_open()?;

        self.teardown().await;
        self.generation += 1;
        self.last_error = None;
        self.set_state(NegotiationState::Creating);

        let created = self.client.create_session(avatar_id, voice_id).await;
        match created {
            Ok(info) => {
                info!(
                    session_id = %info.session_id,
                    generation = self.generation,
                    relays = info.ice_endpoints.len(),
                    "session created"
                );
                self.session = Some(ActiveSession {
                    session_id: info.session_id,
                    media_descriptor: info.media_descriptor,
                    ice_endpoints: info.ice_endpoints,
                    transport: None,
                });
                self.set_state(NegotiationState::Negotiating);
                Ok(())
            }
            Err(e) => Err(self.fail("create_session", e).await),
        }
    }

    /// Answer the provider's offer, submit the answer and wait for the
    /// first media frame.
    pub async fn negotiate(&mut self) -> Result<()> {
        self.expect_state(NegotiationState::Negotiating, "negotiate")?;

        let (session_id, remote, ice) = match self.session.as_ref() {
            Some(s) => (
                s.session_id.clone(),
                s.media_descriptor.clone(),
                s.ice_endpoints.clone(),
            ),
            None => {
                let err = AvatarError::InvalidSessionState("no session to negotiate".to_string());
                return Err(self.fail("negotiate", err).await);
            }
        };

        let mut transport = self.transports.create();
        let client = self.client.clone();
        let first_frame_timeout = self.first_frame_timeout;
        let outcome = async {
            let local = transport.accept_offer(&remote, &ice).await?;
            client.submit_local_descriptor(&session_id, &local).await?;
            transport.wait_first_frame(first_frame_timeout).await
        }
        .await;

        match outcome {
            Ok(()) => {
                if let Some(session) = self.session.as_mut() {
                    session.transport = Some(transport);
                }
                info!(session_id = %session_id, "media transport live");
                self.set_state(NegotiationState::Ready);
                Ok(())
            }
            Err(e) => {
                transport.close().await;
                Err(self.fail("negotiate", e).await)
            }
        }
    }

    /// `start` followed by `negotiate`
    pub async fn connect(&mut self, avatar_id: &str, voice_id: &str) -> Result<()> {
        self.start(avatar_id, voice_id).await?;
        self.negotiate().await
    }

    /// Dispatch text to the avatar. Only valid while `Ready`; the engine
    /// stays `Speaking` until [`SessionEngine::acknowledge`].
    pub async fn send_text(&mut self, text: &str) -> Result<SpeakAck> {
        self.expect_state(NegotiationState::Ready, "send_text")?;
        if text.trim().is_empty() {
            return Err(AvatarError::InvalidPrompt("text must not be empty".to_string()));
        }

        let session_id = match self.session_id() {
            Some(id) => id.to_string(),
            None => {
                return Err(AvatarError::InvalidSessionState(
                    "no active session".to_string(),
                ))
            }
        };
        let generation = self.generation;

        self.set_state(NegotiationState::Speaking);
        let sent = self.client.send_text(&session_id, text).await;
        match sent {
            Ok(ack) => {
                debug!(session_id = %session_id, task_id = ?ack.task_id, "speak acknowledged by provider");
                Ok(ack)
            }
            Err(e) => {
                self.log_failure("send_text", &e);
                // a prompt-level failure leaves the session usable
                if self.generation == generation && self.state == NegotiationState::Speaking {
                    self.set_state(NegotiationState::Ready);
                }
                Err(e)
            }
        }
    }

    /// The avatar finished speaking
    pub fn acknowledge(&mut self) -> Result<()> {
        self.expect_state(NegotiationState::Speaking, "acknowledge")?;
        self.set_state(NegotiationState::Ready);
        Ok(())
    }

    /// The media transport broke. Discards the transport; the engine stays
    /// `Failed` until a new `start`.
    pub async fn transport_error(&mut self, reason: &str) {
        if self.state == NegotiationState::Closed {
            warn!(reason, "transport error after close ignored");
            return;
        }
        let err = AvatarError::Transport(reason.to_string());
        let _ = self.fail("transport", err).await;
    }

    /// Tear everything down. Terminal.
    pub async fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.teardown().await;
        self.set_state(NegotiationState::Closed);
        info!(generation = self.generation, "engine closed");
        Ok(())
    }
}

#[async_trait]
impl AvatarBackend for SessionEngine {
    fn backend_name(&self) -> &'static str {
        "streaming"
    }

    fn state(&self) -> NegotiationState {
        self.state
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    async fn prepare(&mut self) -> Result<()> {
        let (avatar_id, voice_id) = (self.avatar_id.clone(), self.voice_id.clone());
        self.connect(&avatar_id, &voice_id).await
    }

    async fn speak(&mut self, text: &str) -> Result<Utterance> {
        let ack = self.send_text(text).await?;
        Ok(Utterance::Streamed {
            task_id: ack.task_id,
            duration: ack.duration_ms.map(Duration::from_millis),
        })
    }

    fn finish_utterance(&mut self) -> Result<()> {
        self.acknowledge()
    }

    async fn shutdown(&mut self) -> Result<()> {
        match self.close().await {
            Err(AvatarError::SessionClosed) => Ok(()),
            other => other,
        }
    }
}
