//! Conversation Sequencer
//!
//! Keeps the outgoing prompt queue and the transcript for one backend.
//! Prompts are dispatched strictly in enqueue order and only one is ever
//! in flight: the head is `Sent` until it is acknowledged or fails.
//!
//! Prompts belong to the backend session they were queued for. When that
//! session fails, closes or is replaced, its outstanding prompts are
//! retired as `Failed` on the next sequencer call and never reach the
//! new session.

use crate::backend::{AvatarBackend, Utterance};
use crate::engine::NegotiationState;
use crate::error::{AvatarError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PromptId(pub u64);

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchState {
    Queued,
    Sent,
    Acknowledged,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Prompt {
    pub id: PromptId,
    pub text: String,
    pub origin_timestamp: DateTime<Utc>,
    pub dispatch_state: DispatchState,
    pub failure: Option<String>,
    pub utterance: Option<Utterance>,
    /// Backend generation the prompt was queued for
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    pub speaker: Speaker,
    pub content: String,
}

pub struct ConversationSequencer<B: AvatarBackend> {
    backend: B,
    pending: VecDeque<Prompt>,
    retired: Vec<Prompt>,
    transcript: Vec<TranscriptEntry>,
    next_id: u64,
}

impl<B: AvatarBackend> ConversationSequencer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            pending: VecDeque::new(),
            retired: Vec::new(),
            transcript: Vec::new(),
            next_id: 1,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Prompts not yet acknowledged or failed, head first
    pub fn pending(&self) -> impl Iterator<Item = &Prompt> {
        self.pending.iter()
    }

    /// The prompt currently being spoken
    pub fn in_flight(&self) -> Option<&Prompt> {
        self.pending
            .front()
            .filter(|p| p.dispatch_state == DispatchState::Sent)
    }

    pub fn prompt(&self, id: PromptId) -> Option<&Prompt> {
        self.pending
            .iter()
            .chain(self.retired.iter())
            .find(|p| p.id == id)
    }

    /// Acknowledged and failed prompts, oldest first
    pub fn history(&self) -> &[Prompt] {
        &self.retired
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Record what the candidate said
    pub fn record_user(&mut self, text: &str) {
        self.transcript.push(TranscriptEntry {
            timestamp: Utc::now(),
            speaker: Speaker::User,
            content: text.to_string(),
        });
    }

    /// Queue `text` for the avatar and dispatch it if nothing is in flight
    pub async fn enqueue(&mut self, text: &str) -> Result<PromptId> {
        if text.trim().is_empty() {
            return Err(AvatarError::InvalidPrompt("text must not be empty".to_string()));
        }
        self.reconcile();
        match self.backend.state() {
            NegotiationState::Ready | NegotiationState::Speaking => {}
            NegotiationState::Closed => return Err(AvatarError::SessionClosed),
            other => {
                return Err(AvatarError::InvalidSessionState(format!(
                    "cannot enqueue while backend is {}",
                    other
                )))
            }
        }

        let id = PromptId(self.next_id);
        self.next_id += 1;
        let now = Utc::now();

        self.pending.push_back(Prompt {
            id,
            text: text.to_string(),
            origin_timestamp: now,
            dispatch_state: DispatchState::Queued,
            failure: None,
            utterance: None,
            generation: self.backend.generation(),
        });
        self.transcript.push(TranscriptEntry {
            timestamp: now,
            speaker: Speaker::Ai,
            content: text.to_string(),
        });
        debug!(prompt_id = %id, queued = self.pending.len(), "prompt queued");

        self.dispatch_next().await;
        Ok(id)
    }

    /// The in-flight prompt was spoken
    pub async fn on_acknowledged(&mut self) -> Result<PromptId> {
        self.reconcile();
        let id = self.head_in_flight()?;
        self.backend.finish_utterance()?;
        self.retire(DispatchState::Acknowledged, None);
        info!(prompt_id = %id, "prompt acknowledged");

        self.dispatch_next().await;
        Ok(id)
    }

    /// The in-flight prompt could not be spoken. The queue moves on; the
    /// prompt is not retried.
    pub async fn on_failed(&mut self, reason: &str) -> Result<PromptId> {
        self.reconcile();
        let id = self.head_in_flight()?;
        if let Err(e) = self.backend.finish_utterance() {
            debug!(prompt_id = %id, error = %e, "backend not speaking");
        }
        self.retire(DispatchState::Failed, Some(reason.to_string()));
        warn!(prompt_id = %id, reason, "prompt failed");

        self.dispatch_next().await;
        Ok(id)
    }

    /// Fail every queued or in-flight prompt, e.g. after a transport error
    pub fn discard_outstanding(&mut self, reason: &str) -> usize {
        let count = self.pending.len();
        while !self.pending.is_empty() {
            self.retire(DispatchState::Failed, Some(reason.to_string()));
        }
        if count > 0 {
            warn!(count, reason, "discarded outstanding prompts");
        }
        count
    }

    /// Dispatch the head prompt if the backend has become ready
    pub async fn resume(&mut self) {
        self.dispatch_next().await;
    }

    /// Retire prompts whose session is gone: everything outstanding once
    /// the backend failed or closed, and anything queued for an earlier
    /// generation after a restart.
    fn reconcile(&mut self) -> usize {
        let reason = match self.backend.state() {
            NegotiationState::Failed => Some("session failed"),
            NegotiationState::Closed => Some("session closed"),
            _ => None,
        };
        if let Some(reason) = reason {
            return self.discard_outstanding(reason);
        }

        let current = self.backend.generation();
        let (stale, live): (VecDeque<Prompt>, VecDeque<Prompt>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| p.generation != current);
        self.pending = live;
        let count = stale.len();
        for mut prompt in stale {
            prompt.dispatch_state = DispatchState::Failed;
            prompt.failure = Some("session replaced".to_string());
            self.retired.push(prompt);
        }
        if count > 0 {
            warn!(count, generation = current, "retired prompts of a replaced session");
        }
        count
    }

    fn head_in_flight(&self) -> Result<PromptId> {
        self.in_flight()
            .map(|p| p.id)
            .ok_or_else(|| AvatarError::InvalidSessionState("no prompt in flight".to_string()))
    }

    fn retire(&mut self, state: DispatchState, failure: Option<String>) {
        if let Some(mut prompt) = self.pending.pop_front() {
            prompt.dispatch_state = state;
            prompt.failure = failure;
            self.retired.push(prompt);
        }
    }

    async fn dispatch_next(&mut self) {
        self.reconcile();
        loop {
            if self.backend.state() != NegotiationState::Ready {
                return;
            }
            let text = match self.pending.front_mut() {
                Some(head) if head.dispatch_state == DispatchState::Queued => {
                    head.dispatch_state = DispatchState::Sent;
                    head.text.clone()
                }
                _ => return,
            };

            match self.backend.speak(&text).await {
                Ok(utterance) => {
                    if let Some(head) = self.pending.front_mut() {
                        debug!(prompt_id = %head.id, backend = self.backend.backend_name(), "prompt sent");
                        head.utterance = Some(utterance);
                    }
                    return;
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.retire(DispatchState::Failed, Some(reason.clone()));
                    warn!(error = %reason, "prompt dispatch failed");

                    if matches!(
                        self.backend.state(),
                        NegotiationState::Failed | NegotiationState::Closed
                    ) {
                        self.discard_outstanding(&reason);
                        return;
                    }
                }
            }
        }
    }
}
