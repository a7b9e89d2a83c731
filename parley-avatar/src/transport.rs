//! Media transport seam
//!
//! The engine never touches media directly: it asks a [`MediaTransport`]
//! to answer the provider's offer and to report when the first frame has
//! arrived, so text is only sent once the stream is actually live.

use crate::error::{AvatarError, Result};
use crate::wire::{IceServer, SessionDescription};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Build the local descriptor answering `remote`
    async fn accept_offer(
        &mut self,
        remote: &SessionDescription,
        ice_endpoints: &[IceServer],
    ) -> Result<SessionDescription>;

    /// Resolve once the first media frame is received
    async fn wait_first_frame(&mut self, timeout: Duration) -> Result<()>;

    /// Release tracks and handles; idempotent
    async fn close(&mut self);
}

/// Creates one transport per session
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn MediaTransport>;
}

/// Transport for clients that cannot render video.
///
/// Answers the offer with a receive-only description and reports the
/// stream as live straight away.
#[derive(Debug, Default)]
pub struct HeadlessTransport {
    answered: bool,
    closed: bool,
}

impl HeadlessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Attribute prefixes copied from each offered media section
const CARRIED_ATTRIBUTES: [&str; 6] = [
    "a=mid:",
    "a=rtpmap:",
    "a=fmtp:",
    "a=rtcp-fb:",
    "a=rtcp-mux",
    "a=extmap:",
];

fn random_token(len: usize) -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    raw[..len.min(raw.len())].to_string()
}

/// Derive a receive-only SDP answer from an offer
pub fn recvonly_answer(offer: &str) -> Result<String> {
    let offer = offer.trim();
    if !offer.starts_with("v=0") {
        return Err(AvatarError::Transport("offer is not an SDP document".to_string()));
    }

    let session_version = uuid::Uuid::new_v4().as_u128() as u64 >> 1;
    let ufrag = random_token(8);
    let pwd = random_token(24);

    let mut answer = vec![
        "v=0".to_string(),
        format!("o=- {} 2 IN IP4 127.0.0.1", session_version),
        "s=-".to_string(),
        "t=0 0".to_string(),
    ];
    let mut sections = 0;

    for line in offer.lines().map(str::trim_end) {
        if line.starts_with("a=group:") || line.starts_with("a=msid-semantic:") {
            answer.push(line.to_string());
        } else if line.starts_with("m=") {
            sections += 1;
            answer.push(line.to_string());
            answer.push("c=IN IP4 0.0.0.0".to_string());
            answer.push(format!("a=ice-ufrag:{}", ufrag));
            answer.push(format!("a=ice-pwd:{}", pwd));
            answer.push("a=setup:active".to_string());
            answer.push("a=recvonly".to_string());
        } else if sections > 0 && CARRIED_ATTRIBUTES.iter().any(|p| line.starts_with(p)) {
            answer.push(line.to_string());
        }
    }

    if sections == 0 {
        return Err(AvatarError::Transport("offer has no media sections".to_string()));
    }

    let mut sdp = answer.join("\r\n");
    sdp.push_str("\r\n");
    Ok(sdp)
}

#[async_trait]
impl MediaTransport for HeadlessTransport {
    async fn accept_offer(
        &mut self,
        remote: &SessionDescription,
        ice_endpoints: &[IceServer],
    ) -> Result<SessionDescription> {
        if self.closed {
            return Err(AvatarError::Transport("transport closed".to_string()));
        }
        if remote.kind != "offer" {
            return Err(AvatarError::Transport(format!(
                "expected an offer, got {}",
                remote.kind
            )));
        }

        let sdp = recvonly_answer(&remote.sdp)?;
        self.answered = true;
        debug!(relays = ice_endpoints.len(), "answered offer");
        Ok(SessionDescription::answer(sdp))
    }

    async fn wait_first_frame(&mut self, _timeout: Duration) -> Result<()> {
        if self.closed {
            return Err(AvatarError::Transport("transport closed".to_string()));
        }
        if !self.answered {
            return Err(AvatarError::Transport("no offer accepted yet".to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessTransportFactory;

impl TransportFactory for HeadlessTransportFactory {
    fn create(&self) -> Box<dyn MediaTransport> {
        Box::new(HeadlessTransport::new())
    }
}
