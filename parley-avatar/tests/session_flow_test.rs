//! Session, sequencer and poller scenarios

mod common;

use parley_avatar::client::{AvatarServiceClient, HttpAvatarClient};
use parley_avatar::{
    AvatarBackend, AvatarError, ClipBackend, ConversationSequencer, DispatchState,
    HeadlessTransportFactory, InterviewSession, NegotiationState, PollBudget, ScriptedInterviewer,
    SessionEngine, Speaker, StatusPoller,
};
use parley_core::config::{ClipConfig, ProviderConfig};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn client_for(base_url: &str) -> Arc<dyn AvatarServiceClient> {
    let provider = ProviderConfig {
        base_url: base_url.to_string(),
        ..ProviderConfig::default()
    };
    Arc::new(HttpAvatarClient::new(&provider, &ClipConfig::default()).unwrap())
}

fn engine_for(client: Arc<dyn AvatarServiceClient>) -> SessionEngine {
    SessionEngine::new(
        client,
        Arc::new(HeadlessTransportFactory),
        &ProviderConfig::default(),
    )
}

#[tokio::test]
async fn test_hello_round_trip() {
    let provider = common::MockProvider::new();
    let client = client_for(&common::spawn(provider.clone()).await);

    let mut engine = engine_for(client);
    engine.start("June_HR_public", "voice-1").await.unwrap();
    engine.negotiate().await.unwrap();
    assert_eq!(engine.state(), NegotiationState::Ready);

    let mut sequencer = ConversationSequencer::new(engine);
    let id = sequencer.enqueue("hello").await.unwrap();
    assert_eq!(sequencer.backend().state(), NegotiationState::Speaking);

    sequencer.on_acknowledged().await.unwrap();

    let entries: Vec<_> = sequencer
        .transcript()
        .iter()
        .filter(|e| e.content == "hello")
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].speaker, Speaker::Ai);
    assert_eq!(
        sequencer.prompt(id).unwrap().dispatch_state,
        DispatchState::Acknowledged
    );
    assert_eq!(sequencer.backend().state(), NegotiationState::Ready);
    assert_eq!(provider.spoken_texts(), vec!["hello".to_string()]);
}

#[tokio::test]
async fn test_enqueue_before_negotiation_is_rejected() {
    let provider = common::MockProvider::new();
    let client = client_for(&common::spawn(provider.clone()).await);

    let mut engine = engine_for(client);
    engine.start("June_HR_public", "voice-1").await.unwrap();

    let mut sequencer = ConversationSequencer::new(engine);
    assert!(matches!(
        sequencer.enqueue("hello").await,
        Err(AvatarError::InvalidSessionState(_))
    ));
    assert!(provider.spoken_texts().is_empty());
}

#[tokio::test]
async fn test_everything_fails_after_close() {
    let provider = common::MockProvider::new();
    let client = client_for(&common::spawn(provider.clone()).await);

    let mut engine = engine_for(client);
    engine.connect("June_HR_public", "voice-1").await.unwrap();
    engine.close().await.unwrap();
    assert_eq!(*provider.closed.lock(), vec!["sess-1".to_string()]);

    assert!(matches!(engine.start("a", "v").await, Err(AvatarError::SessionClosed)));
    assert!(matches!(engine.negotiate().await, Err(AvatarError::SessionClosed)));
    assert!(matches!(engine.send_text("hi").await, Err(AvatarError::SessionClosed)));
    assert!(matches!(engine.acknowledge(), Err(AvatarError::SessionClosed)));
    assert!(matches!(engine.close().await, Err(AvatarError::SessionClosed)));

    let mut sequencer = ConversationSequencer::new(engine);
    assert!(matches!(
        sequencer.enqueue("hi").await,
        Err(AvatarError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_transport_error_fails_session_until_recreated() {
    let provider = common::MockProvider::new();
    let client = client_for(&common::spawn(provider.clone()).await);

    let mut engine = engine_for(client);
    let mut observer = engine.subscribe();
    engine.connect("June_HR_public", "voice-1").await.unwrap();

    let mut sequencer = ConversationSequencer::new(engine);
    let one = sequencer.enqueue("one").await.unwrap();
    let two = sequencer.enqueue("two").await.unwrap();

    sequencer.backend_mut().transport_error("ice disconnected").await;
    assert_eq!(sequencer.backend().state(), NegotiationState::Failed);

    let snapshot = observer.borrow_and_update().clone();
    assert_eq!(snapshot.state, NegotiationState::Failed);
    assert!(snapshot.last_error.unwrap().contains("ice disconnected"));

    assert!(matches!(
        sequencer.enqueue("three").await,
        Err(AvatarError::InvalidSessionState(_))
    ));
    // the failed session took its prompts with it
    assert!(sequencer.is_idle());
    for id in [one, two] {
        assert_eq!(sequencer.prompt(id).unwrap().dispatch_state, DispatchState::Failed);
    }
    assert!(matches!(
        sequencer.backend_mut().negotiate().await,
        Err(AvatarError::InvalidSessionState(_))
    ));

    // recreation is the way out
    sequencer.backend_mut().prepare().await.unwrap();
    assert_eq!(sequencer.backend().state(), NegotiationState::Ready);
    assert_eq!(sequencer.backend().session_id(), Some("sess-2"));
    assert_eq!(*provider.closed.lock(), vec!["sess-1".to_string()]);

    let three = sequencer.enqueue("three").await.unwrap();
    assert_eq!(sequencer.in_flight().map(|p| p.id), Some(three));
    sequencer.on_acknowledged().await.unwrap();
    assert!(sequencer.is_idle());
    assert_eq!(
        *provider.spoken.lock(),
        vec![
            ("sess-1".to_string(), "one".to_string()),
            ("sess-2".to_string(), "three".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_restart_drops_prompts_queued_for_old_session() {
    let provider = common::MockProvider::new();
    let client = client_for(&common::spawn(provider.clone()).await);

    let mut engine = engine_for(client);
    engine.connect("June_HR_public", "voice-1").await.unwrap();

    let mut sequencer = ConversationSequencer::new(engine);
    sequencer.enqueue("one").await.unwrap();
    let stale = sequencer.enqueue("two-for-session-1").await.unwrap();

    sequencer.backend_mut().prepare().await.unwrap();
    assert_eq!(sequencer.backend().session_id(), Some("sess-2"));

    let fresh = sequencer.enqueue("hello again").await.unwrap();
    assert_eq!(sequencer.in_flight().map(|p| p.id), Some(fresh));
    assert_eq!(sequencer.prompt(stale).unwrap().dispatch_state, DispatchState::Failed);

    sequencer.on_acknowledged().await.unwrap();
    assert!(sequencer.is_idle());
    assert_eq!(
        provider.spoken_texts(),
        vec!["one".to_string(), "hello again".to_string()]
    );
}

#[tokio::test]
async fn test_poll_until_completed() {
    let provider = common::MockProvider::new();
    provider.script_render(vec![
        json!({"status": "processing"}),
        json!({"status": "processing"}),
        json!({"status": "processing"}),
        json!({"status": "completed", "result_url": "https://cdn.example.com/clip.mp4"}),
    ]);
    let client = client_for(&common::spawn(provider.clone()).await);

    let job_id = client.submit_render_job("Tell me about yourself").await.unwrap();
    assert_eq!(job_id, "job-1");

    let poller = StatusPoller::new(client, Duration::from_millis(10), PollBudget::Bounded(12));
    let url = poller.poll(&job_id, &CancellationToken::new()).await.unwrap();
    assert_eq!(url, "https://cdn.example.com/clip.mp4");
    assert_eq!(provider.render_polls.load(Ordering::SeqCst), 4);

    // nothing keeps polling in the background
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(provider.render_polls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_poll_failure_stops_immediately() {
    let provider = common::MockProvider::new();
    provider.script_render(vec![json!({"status": "failed", "message": "bad voice id"})]);
    let client = client_for(&common::spawn(provider.clone()).await);

    let poller = StatusPoller::new(client, Duration::from_millis(10), PollBudget::Unbounded);
    match poller.poll("job-1", &CancellationToken::new()).await {
        Err(AvatarError::GenerationFailed(message)) => assert_eq!(message, "bad voice id"),
        other => panic!("unexpected: {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(provider.render_polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unbounded_poll_stops_on_cancel() {
    let provider = common::MockProvider::new();
    let client = client_for(&common::spawn(provider.clone()).await);

    let poller = StatusPoller::new(client, Duration::from_millis(10), PollBudget::Unbounded);
    let handle = poller.spawn("job-1".to_string(), CancellationToken::new());

    tokio::time::sleep(Duration::from_millis(60)).await;
    handle.cancel();
    assert!(matches!(handle.join().await, Err(AvatarError::Cancelled)));

    let polls = provider.render_polls.load(Ordering::SeqCst);
    assert!(polls >= 1);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(provider.render_polls.load(Ordering::SeqCst), polls);
}

#[tokio::test]
async fn test_interview_over_stream() {
    let provider = Arc::new(common::MockProvider {
        speak_duration_ms: Some(5),
        ..Default::default()
    });
    let client = client_for(&common::spawn(provider.clone()).await);

    let mut interview = InterviewSession::new(
        engine_for(client),
        Box::new(ScriptedInterviewer),
        "Hello! Please introduce yourself.",
    );
    interview.start().await.unwrap();
    interview.settle().await.unwrap();

    interview.respond("I work on compilers").await.unwrap();
    interview.settle().await.unwrap();
    interview.finish().await.unwrap();

    let spoken = provider.spoken_texts();
    assert_eq!(spoken.len(), 2);
    assert_eq!(spoken[0], "Hello! Please introduce yourself.");
    assert!(spoken[1].ends_with("most significant professional achievement?"));

    let speakers: Vec<Speaker> = interview.transcript().iter().map(|e| e.speaker).collect();
    assert_eq!(speakers, vec![Speaker::Ai, Speaker::User, Speaker::Ai]);
    assert_eq!(interview.sequencer().backend().state(), NegotiationState::Closed);
}

#[tokio::test]
async fn test_interview_over_clips() {
    let provider = common::MockProvider::new();
    provider.script_render(vec![
        json!({"status": "completed", "result_url": "https://cdn.example.com/clip.mp4"}),
    ]);
    let client = client_for(&common::spawn(provider.clone()).await);
    let poller = StatusPoller::new(client.clone(), Duration::from_millis(5), PollBudget::Bounded(12));

    let mut interview = InterviewSession::new(
        ClipBackend::new(client, poller),
        Box::new(ScriptedInterviewer),
        "Hello!",
    );
    interview.start().await.unwrap();
    let spoken = interview.settle().await.unwrap();
    assert_eq!(spoken.len(), 1);

    interview.respond("I like hiking").await.unwrap();
    interview.settle().await.unwrap();
    interview.finish().await.unwrap();

    let rendered = provider.rendered.lock();
    assert_eq!(rendered.len(), 2);
    assert!(rendered[1]["text"]
        .as_str()
        .unwrap()
        .ends_with("What motivates you in your career?"));
}
