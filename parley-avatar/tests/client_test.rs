//! HTTP client tests against the mock provider

mod common;

use parley_avatar::client::{AvatarServiceClient, HttpAvatarClient};
use parley_avatar::{AvatarError, RenderStatus, SessionDescription};
use parley_core::config::{ClipConfig, ProviderConfig};
use serde_json::json;
use std::sync::atomic::Ordering;
use tokio_test::assert_ok;

fn client_for(base_url: &str) -> HttpAvatarClient {
    let provider = ProviderConfig {
        base_url: base_url.to_string(),
        request_timeout_secs: 5,
        ..ProviderConfig::default()
    };
    HttpAvatarClient::new(&provider, &ClipConfig::default()).unwrap()
}

#[tokio::test]
async fn test_session_lifecycle_calls() {
    let provider = common::MockProvider::new();
    let client = client_for(&common::spawn(provider.clone()).await);

    let info = assert_ok!(client.create_session("June_HR_public", "voice-1").await);
    assert_eq!(info.session_id, "sess-1");
    assert_eq!(info.media_descriptor.kind, "offer");
    assert_eq!(info.ice_endpoints.len(), 1);

    client
        .submit_local_descriptor(&info.session_id, &SessionDescription::answer("v=0"))
        .await
        .unwrap();
    assert_eq!(*provider.negotiated.lock(), vec!["sess-1".to_string()]);

    let ack = assert_ok!(client.send_text(&info.session_id, "hello").await);
    assert_eq!(ack.task_id.as_deref(), Some("task-1"));
    assert_eq!(provider.spoken_texts(), vec!["hello".to_string()]);

    client.close_session(&info.session_id).await;
    assert_eq!(*provider.closed.lock(), vec!["sess-1".to_string()]);
}

#[tokio::test]
async fn test_rejection_message_is_surfaced_verbatim() {
    let provider = common::MockProvider::new();
    let client = client_for(&common::spawn(provider.clone()).await);

    match client.create_session("missing", "voice-1").await {
        Err(AvatarError::ProviderRejected(message)) => assert_eq!(message, "avatar not found"),
        other => panic!("unexpected: {:?}", other),
    }

    provider.reject_negotiation.store(true, Ordering::SeqCst);
    match client
        .submit_local_descriptor("sess-9", &SessionDescription::answer("v=0"))
        .await
    {
        Err(AvatarError::ProviderRejected(message)) => assert_eq!(message, "bad answer"),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_provider_is_retryable() {
    let client = client_for(&common::dead_url().await);
    let err = client.create_session("a", "v").await.unwrap_err();
    assert!(matches!(err, AvatarError::ProviderUnavailable(_)));
    assert!(err.is_retryable());

    // close never propagates
    client.close_session("sess-1").await;
}

#[tokio::test]
async fn test_render_request_and_status() {
    let provider = common::MockProvider::new();
    provider.script_render(vec![
        json!({"status": "pending"}),
        json!({"status": "completed", "result_url": "https://cdn.example.com/clip.mp4"}),
    ]);
    let client = client_for(&common::spawn(provider.clone()).await);

    let job_id = client.submit_render_job("Tell me about yourself").await.unwrap();
    assert_eq!(job_id, "job-1");

    let sent = provider.rendered.lock()[0].clone();
    assert_eq!(sent["text"], "Tell me about yourself");
    assert_eq!(sent["avatar_id"], "June_HR_public");
    assert_eq!(sent["dimension"], json!({"width": 1280, "height": 720}));
    assert_eq!(sent["background"], "#008000");
    assert_eq!(sent["avatar_style"], "normal");

    let first = client.poll_render_job(&job_id).await.unwrap();
    assert_eq!(first.status, RenderStatus::Queued);
    let second = client.poll_render_job(&job_id).await.unwrap();
    assert_eq!(second.status, RenderStatus::Completed);
    assert_eq!(
        second.result_url.as_deref(),
        Some("https://cdn.example.com/clip.mp4")
    );
}
