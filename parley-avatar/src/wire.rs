//! Request and response bodies exchanged with the avatar provider

use crate::error::{AvatarError, Result};
use serde::{Deserialize, Serialize};

/// Connection-negotiation descriptor (an SDP offer or answer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: String,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "offer".to_string(),
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: "answer".to_string(),
            sdp: sdp.into(),
        }
    }
}

/// Relay candidate for the media connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub avatar_id: String,
    pub voice_id: String,
    pub quality: String,
}

/// What the provider hands back for a new streaming session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub media_descriptor: SessionDescription,
    #[serde(default)]
    pub ice_endpoints: Vec<IceServer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiateRequest {
    pub local_descriptor: SessionDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakRequest {
    pub text: String,
}

/// Acknowledgement of a speak request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakAck {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    pub text: String,
    pub voice_id: String,
    pub avatar_id: String,
    pub dimension: Dimension,
    pub background: String,
    pub avatar_style: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSubmitted {
    pub job_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RenderStatus {
    /// Map a provider status string
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "waiting" | "queued" => Some(RenderStatus::Queued),
            "processing" => Some(RenderStatus::Processing),
            "completed" | "ready" => Some(RenderStatus::Completed),
            "failed" | "error" => Some(RenderStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RenderStatus::Completed | RenderStatus::Failed)
    }
}

/// Raw body of `GET /render/{job_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderStatusBody {
    pub status: String,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A clip-generation job as last observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub job_id: String,
    pub status: RenderStatus,
    pub result_url: Option<String>,
    pub message: Option<String>,
}

impl RenderJob {
    pub fn from_body(job_id: &str, body: RenderStatusBody) -> Result<Self> {
        let status = RenderStatus::parse(&body.status).ok_or_else(|| {
            AvatarError::ProviderRejected(format!("unrecognized render status: {}", body.status))
        })?;
        let result_url = match status {
            RenderStatus::Completed => body.result_url.filter(|u| !u.is_empty()),
            _ => None,
        };
        Ok(Self {
            job_id: job_id.to_string(),
            status,
            result_url,
            message: body.message,
        })
    }
}

/// Error bodies larger than this are cut before inspection
pub const MAX_ERROR_BODY: usize = 10 * 1024;

/// Pull a human readable message out of an error body.
///
/// Looks at `error.message`, then `message`, then a string `error`;
/// falls back to `HTTP <status>`.
pub fn error_message(status: u16, body: &[u8]) -> String {
    let body = &body[..body.len().min(MAX_ERROR_BODY)];
    let fallback = || format!("HTTP {}", status);

    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return fallback(),
    };

    let nested = value
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str());
    let top = value.get("message").and_then(|m| m.as_str());
    let plain = value.get("error").and_then(|e| e.as_str());

    nested
        .or(top)
        .or(plain)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(fallback)
}
