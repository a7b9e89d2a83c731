//! Avatar Service Client
//!
//! Stateless request/response wrapper around the provider's session
//! lifecycle and render endpoints. Nothing is remembered between calls.

use crate::error::{AvatarError, Result};
use crate::wire::{
    error_message, CreateSessionRequest, Dimension, NegotiateRequest, RenderJob, RenderRequest,
    RenderStatusBody, RenderSubmitted, SessionDescription, SessionInfo, SpeakAck, SpeakRequest,
    MAX_ERROR_BODY,
};
use async_trait::async_trait;
use parley_core::config::{ClipConfig, ProviderConfig};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Characters escaped when an id is placed in a path segment
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Largest success body accepted from the provider
const MAX_RESPONSE_SIZE: usize = 100 * 1024;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AvatarServiceClient: Send + Sync {
    /// Ask the provider for a new streaming session
    async fn create_session(&self, avatar_id: &str, voice_id: &str) -> Result<SessionInfo>;

    /// Hand the locally generated descriptor back to the provider
    async fn submit_local_descriptor(
        &self,
        session_id: &str,
        local_descriptor: &SessionDescription,
    ) -> Result<()>;

    async fn send_text(&self, session_id: &str, text: &str) -> Result<SpeakAck>;

    /// Best-effort: failures are logged, never returned
    async fn close_session(&self, session_id: &str);

    /// Queue a finished-clip render, returning the job id
    async fn submit_render_job(&self, text: &str) -> Result<String>;

    async fn poll_render_job(&self, job_id: &str) -> Result<RenderJob>;
}

fn require_session(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(AvatarError::InvalidSessionState(
            "no active session".to_string(),
        ));
    }
    Ok(())
}

/// HTTP implementation talking to the credential mediator
#[derive(Clone)]
pub struct HttpAvatarClient {
    client: Arc<Client>,
    base_url: String,
    avatar_id: String,
    voice_id: String,
    quality: String,
    clip: ClipConfig,
}

impl HttpAvatarClient {
    pub fn new(provider: &ProviderConfig, clip: &ClipConfig) -> Result<Self> {
        let base_url = provider.base_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AvatarError::Config(format!(
                "unsupported scheme in provider URL: {}",
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(provider.request_timeout())
            .build()
            .map_err(|e| AvatarError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            base_url,
            avatar_id: provider.avatar_id.clone(),
            voice_id: provider.voice_id.clone(),
            quality: provider.quality.as_str().to_string(),
            clip: clip.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        for segment in segments {
            url.push('/');
            url.extend(utf8_percent_encode(segment, PATH_SEGMENT));
        }
        url
    }

    /// Send a request and return the raw success body
    async fn call<B: Serialize + ?Sized>(
        &self,
        operation: &'static str,
        method: Method,
        url: String,
        body: Option<&B>,
    ) -> Result<bytes::Bytes> {
        debug!(operation, url = %url, "provider request");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(operation, error = %e, "provider unreachable");
            AvatarError::ProviderUnavailable(format!("{}: {}", operation, e))
        })?;

        let status = response.status();
        if let Some(length) = response.content_length() {
            if status.is_success() && length as usize > MAX_RESPONSE_SIZE {
                return Err(AvatarError::ProviderRejected(format!(
                    "{}: response too large (max {} bytes)",
                    operation, MAX_RESPONSE_SIZE
                )));
            }
        }

        let bytes = response.bytes().await.map_err(|e| {
            AvatarError::ProviderUnavailable(format!("{}: failed to read response: {}", operation, e))
        })?;

        if !status.is_success() {
            let body = &bytes[..bytes.len().min(MAX_ERROR_BODY)];
            let message = error_message(status.as_u16(), body);
            warn!(operation, status = status.as_u16(), message = %message, "provider rejected request");
            return Err(AvatarError::ProviderRejected(message));
        }

        if bytes.len() > MAX_RESPONSE_SIZE {
            return Err(AvatarError::ProviderRejected(format!(
                "{}: response too large (max {} bytes)",
                operation, MAX_RESPONSE_SIZE
            )));
        }

        Ok(bytes)
    }

    async fn call_json<B, R>(
        &self,
        operation: &'static str,
        method: Method,
        url: String,
        body: Option<&B>,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let bytes = self.call(operation, method, url, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl AvatarServiceClient for HttpAvatarClient {
    async fn create_session(&self, avatar_id: &str, voice_id: &str) -> Result<SessionInfo> {
        let request = CreateSessionRequest {
            avatar_id: avatar_id.to_string(),
            voice_id: voice_id.to_string(),
            quality: self.quality.clone(),
        };
        let info: SessionInfo = self
            .call_json("create_session", Method::POST, self.url(&["session"]), Some(&request))
            .await?;

        if info.session_id.is_empty() {
            return Err(AvatarError::ProviderRejected(
                "provider returned an empty session id".to_string(),
            ));
        }
        debug!(session_id = %info.session_id, ice = info.ice_endpoints.len(), "session created");
        Ok(info)
    }

    async fn submit_local_descriptor(
        &self,
        session_id: &str,
        local_descriptor: &SessionDescription,
    ) -> Result<()> {
        require_session(session_id)?;
        let request = NegotiateRequest {
            local_descriptor: local_descriptor.clone(),
        };
        self.call(
            "submit_local_descriptor",
            Method::POST,
            self.url(&["session", session_id, "negotiate"]),
            Some(&request),
        )
        .await?;
        Ok(())
    }

    async fn send_text(&self, session_id: &str, text: &str) -> Result<SpeakAck> {
        require_session(session_id)?;
        let request = SpeakRequest {
            text: text.to_string(),
        };
        let bytes = self
            .call(
                "send_text",
                Method::POST,
                self.url(&["session", session_id, "speak"]),
                Some(&request),
            )
            .await?;

        // some providers answer with an empty body
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(SpeakAck::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn close_session(&self, session_id: &str) {
        if session_id.trim().is_empty() {
            return;
        }
        let result = self
            .call::<()>(
                "close_session",
                Method::POST,
                self.url(&["session", session_id, "close"]),
                None,
            )
            .await;
        if let Err(e) = result {
            warn!(operation = "close_session", session_id, error = %e, "close failed");
        }
    }

    async fn submit_render_job(&self, text: &str) -> Result<String> {
        let request = RenderRequest {
            text: text.to_string(),
            voice_id: self.voice_id.clone(),
            avatar_id: self.avatar_id.clone(),
            dimension: Dimension {
                width: self.clip.width,
                height: self.clip.height,
            },
            background: self.clip.background.clone(),
            avatar_style: self.clip.avatar_style.clone(),
        };
        let submitted: RenderSubmitted = self
            .call_json("submit_render_job", Method::POST, self.url(&["render"]), Some(&request))
            .await?;

        if submitted.job_id.is_empty() {
            return Err(AvatarError::ProviderRejected(
                "provider returned an empty job id".to_string(),
            ));
        }
        Ok(submitted.job_id)
    }

    async fn poll_render_job(&self, job_id: &str) -> Result<RenderJob> {
        let body: RenderStatusBody = self
            .call_json::<(), _>("poll_render_job", Method::GET, self.url(&["render", job_id]), None)
            .await?;
        RenderJob::from_body(job_id, body)
    }
}
