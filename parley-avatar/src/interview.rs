//! Interview driver: greets the candidate, turns each answer into the
//! next question and lets the avatar speak it.

use crate::backend::AvatarBackend;
use crate::error::{AvatarError, Result};
use crate::sequencer::{ConversationSequencer, PromptId, TranscriptEntry};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Produces the interviewer's next line
#[async_trait]
pub trait Interviewer: Send + Sync {
    async fn reply(&self, answer: &str, transcript: &[TranscriptEntry]) -> Result<String>;
}

/// Canned follow-up questions
#[derive(Debug, Clone, Default)]
pub struct ScriptedInterviewer;

const FOLLOW_UP_LEAD: &str =
    "Thank you for sharing that. Let me dig a bit deeper into your experience.";
const ACHIEVEMENT_QUESTION: &str =
    "Could you elaborate on your most significant professional achievement?";
const MOTIVATION_QUESTION: &str = "What motivates you in your career?";

#[async_trait]
impl Interviewer for ScriptedInterviewer {
    async fn reply(&self, answer: &str, _transcript: &[TranscriptEntry]) -> Result<String> {
        let question = if answer.contains("work") {
            ACHIEVEMENT_QUESTION
        } else {
            MOTIVATION_QUESTION
        };
        Ok(format!("{} {}", FOLLOW_UP_LEAD, question))
    }
}

pub struct InterviewSession<B: AvatarBackend> {
    sequencer: ConversationSequencer<B>,
    interviewer: Box<dyn Interviewer>,
    greeting: String,
    /// Longest wait for a single utterance in `settle`
    max_utterance: Duration,
    time_limit: Option<Duration>,
    started_at: Option<Instant>,
}

impl<B: AvatarBackend> InterviewSession<B> {
    pub fn new(backend: B, interviewer: Box<dyn Interviewer>, greeting: impl Into<String>) -> Self {
        Self {
            sequencer: ConversationSequencer::new(backend),
            interviewer,
            greeting: greeting.into(),
            max_utterance: Duration::from_secs(120),
            time_limit: None,
            started_at: None,
        }
    }

    pub fn with_max_utterance(mut self, max: Duration) -> Self {
        self.max_utterance = max;
        self
    }

    /// End the interview once `limit` has passed since `start`
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Time left before answers are refused. `None` without a limit or
    /// before `start`.
    pub fn time_remaining(&self) -> Option<Duration> {
        let limit = self.time_limit?;
        let started = self.started_at?;
        Some(limit.saturating_sub(started.elapsed()))
    }

    pub fn is_over_time(&self) -> bool {
        self.time_remaining() == Some(Duration::ZERO)
    }

    pub fn sequencer(&self) -> &ConversationSequencer<B> {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut ConversationSequencer<B> {
        &mut self.sequencer
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.sequencer.transcript()
    }

    /// Bring the backend up and queue the greeting
    pub async fn start(&mut self) -> Result<PromptId> {
        let backend = self.sequencer.backend_mut();
        info!(backend = backend.backend_name(), "starting interview");
        backend.prepare().await?;
        self.started_at = Some(Instant::now());

        let greeting = self.greeting.clone();
        self.sequencer.enqueue(&greeting).await
    }

    /// Record the candidate's answer and queue the follow-up question
    pub async fn respond(&mut self, answer: &str) -> Result<PromptId> {
        if self.is_over_time() {
            warn!("answer after the interview time limit");
            return Err(AvatarError::Timeout(
                "interview time limit reached".to_string(),
            ));
        }
        self.sequencer.record_user(answer);
        let reply = self
            .interviewer
            .reply(answer, self.sequencer.transcript())
            .await?;
        self.sequencer.enqueue(&reply).await
    }

    /// Let every queued utterance play out. Each in-flight prompt is
    /// acknowledged after its reported duration, or at once if the
    /// provider gave none.
    pub async fn settle(&mut self) -> Result<Vec<PromptId>> {
        let mut spoken = Vec::new();
        while let Some(prompt) = self.sequencer.in_flight() {
            let wait = prompt
                .utterance
                .as_ref()
                .and_then(|u| u.duration())
                .map(|d| d.min(self.max_utterance));
            if let Some(wait) = wait {
                debug!(prompt_id = %prompt.id, wait_ms = wait.as_millis() as u64, "waiting for utterance");
                tokio::time::sleep(wait).await;
            }
            spoken.push(self.sequencer.on_acknowledged().await?);
        }
        Ok(spoken)
    }

    pub async fn finish(&mut self) -> Result<()> {
        info!(entries = self.transcript().len(), "interview finished");
        self.sequencer.backend_mut().shutdown().await
    }
}
