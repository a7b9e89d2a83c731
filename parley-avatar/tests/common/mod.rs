//! In-process stand-in for the avatar provider

#![allow(dead_code)]

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const OFFER: &str = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
    m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:0\r\na=sendonly\r\na=rtpmap:111 opus/48000/2\r\n\
    m=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:1\r\na=sendonly\r\na=rtpmap:96 VP8/90000\r\n";

#[derive(Default)]
pub struct MockProvider {
    pub sessions_created: AtomicUsize,
    pub negotiated: Mutex<Vec<String>>,
    pub spoken: Mutex<Vec<(String, String)>>,
    pub closed: Mutex<Vec<String>>,
    pub rendered: Mutex<Vec<Value>>,
    pub render_polls: AtomicUsize,
    /// Bodies returned by `GET /render/{id}`; the last one repeats
    pub render_script: Mutex<VecDeque<Value>>,
    pub reject_negotiation: AtomicBool,
    pub speak_duration_ms: Option<u64>,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_render(&self, bodies: Vec<Value>) {
        *self.render_script.lock() = bodies.into();
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|(_, t)| t.clone()).collect()
    }
}

type Shared = Arc<MockProvider>;

async fn create_session(State(state): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    if body["avatar_id"] == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"message": "avatar not found"}})),
        );
    }
    let n = state.sessions_created.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::OK,
        Json(json!({
            "session_id": format!("sess-{}", n),
            "media_descriptor": {"type": "offer", "sdp": OFFER},
            "ice_endpoints": [{"urls": ["stun:stun.example.com:3478"]}],
        })),
    )
}

async fn negotiate(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if state.reject_negotiation.load(Ordering::SeqCst) {
        return (StatusCode::BAD_REQUEST, Json(json!({"message": "bad answer"})));
    }
    if body["local_descriptor"]["type"] != "answer" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "expected an answer"})),
        );
    }
    state.negotiated.lock().push(id);
    (StatusCode::OK, Json(json!({})))
}

async fn speak(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let text = body["text"].as_str().unwrap_or_default().to_string();
    let mut spoken = state.spoken.lock();
    spoken.push((id, text));
    let task = spoken.len();
    (
        StatusCode::OK,
        Json(json!({
            "task_id": format!("task-{}", task),
            "duration_ms": state.speak_duration_ms,
        })),
    )
}

async fn close(State(state): State<Shared>, Path(id): Path<String>) -> impl IntoResponse {
    state.closed.lock().push(id);
    Json(json!({}))
}

async fn render(State(state): State<Shared>, Json(body): Json<Value>) -> impl IntoResponse {
    let mut rendered = state.rendered.lock();
    rendered.push(body);
    Json(json!({"job_id": format!("job-{}", rendered.len())}))
}

async fn render_status(State(state): State<Shared>, Path(_id): Path<String>) -> impl IntoResponse {
    state.render_polls.fetch_add(1, Ordering::SeqCst);
    let mut script = state.render_script.lock();
    let body = if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    };
    Json(body.unwrap_or_else(|| json!({"status": "processing"})))
}

pub fn router(state: Shared) -> Router {
    Router::new()
        .route("/session", post(create_session))
        .route("/session/:id/negotiate", post(negotiate))
        .route("/session/:id/speak", post(speak))
        .route("/session/:id/close", post(close))
        .route("/render", post(render))
        .route("/render/:id", get(render_status))
        .with_state(state)
}

/// Serve the mock on an ephemeral port, returning its base URL
pub async fn spawn(state: Shared) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Base URL nobody listens on
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
