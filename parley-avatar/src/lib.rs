//! parley-avatar: talking-avatar sessions for Parley interviews
//!
//! Provides:
//! - A stateless client for the avatar provider's session and render endpoints
//! - The session negotiation engine and its observable state machine
//! - A FIFO conversation sequencer with a single in-flight utterance
//! - Cancellable render-job polling
//! - Streaming and clip backends behind one `AvatarBackend` trait

pub mod backend;
pub mod backends;
pub mod client;
pub mod engine;
pub mod error;
pub mod interview;
pub mod poller;
pub mod sequencer;
pub mod transport;
pub mod wire;

pub use backend::{AvatarBackend, Utterance};
pub use backends::ClipBackend;
pub use client::{AvatarServiceClient, HttpAvatarClient};
pub use engine::{NegotiationState, SessionEngine, SessionSnapshot};
pub use error::AvatarError;
pub use interview::{InterviewSession, Interviewer, ScriptedInterviewer};
pub use poller::{PollBudget, PollHandle, StatusPoller};
pub use sequencer::{ConversationSequencer, DispatchState, Prompt, PromptId, Speaker, TranscriptEntry};
pub use transport::{HeadlessTransport, HeadlessTransportFactory, MediaTransport, TransportFactory};
pub use wire::{RenderJob, RenderStatus, SessionDescription, SessionInfo, SpeakAck};
