//! Property tests for prompt ordering

use async_trait::async_trait;
use parley_avatar::error::Result;
use parley_avatar::{
    AvatarBackend, AvatarError, ConversationSequencer, DispatchState, NegotiationState, Utterance,
};
use proptest::prelude::*;

/// Backend that checks it is never asked to speak over itself
#[derive(Default)]
struct StrictBackend {
    speaking: bool,
    spoken: Vec<String>,
    fail_every: Option<usize>,
}

#[async_trait]
impl AvatarBackend for StrictBackend {
    fn backend_name(&self) -> &'static str {
        "strict"
    }

    fn state(&self) -> NegotiationState {
        if self.speaking {
            NegotiationState::Speaking
        } else {
            NegotiationState::Ready
        }
    }

    async fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    async fn speak(&mut self, text: &str) -> Result<Utterance> {
        assert!(!self.speaking, "two prompts in flight");
        self.spoken.push(text.to_string());
        if let Some(n) = self.fail_every {
            if self.spoken.len() % n == 0 {
                return Err(AvatarError::ProviderRejected("flaky".to_string()));
            }
        }
        self.speaking = true;
        Ok(Utterance::Streamed {
            task_id: None,
            duration: None,
        })
    }

    fn finish_utterance(&mut self) -> Result<()> {
        self.speaking = false;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Step {
    Enqueue(String),
    Ack,
    Fail,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => "[a-z]{1,12}".prop_map(Step::Enqueue),
        2 => Just(Step::Ack),
        1 => Just(Step::Fail),
    ]
}

fn run(steps: Vec<Step>, fail_every: Option<usize>) -> (Vec<String>, Vec<String>, bool) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime.block_on(async move {
        let mut sequencer = ConversationSequencer::new(StrictBackend {
            fail_every,
            ..Default::default()
        });
        let mut enqueued = Vec::new();
        let mut at_most_one = true;

        for step in steps {
            match step {
                Step::Enqueue(text) => {
                    sequencer.enqueue(&text).await.unwrap();
                    enqueued.push(text);
                }
                Step::Ack => {
                    let _ = sequencer.on_acknowledged().await;
                }
                Step::Fail => {
                    let _ = sequencer.on_failed("dropped").await;
                }
            }
            let sent = sequencer
                .pending()
                .filter(|p| p.dispatch_state == DispatchState::Sent)
                .count();
            at_most_one &= sent <= 1;
        }

        // drain
        while sequencer.in_flight().is_some() {
            sequencer.on_acknowledged().await.unwrap();
        }

        (enqueued, sequencer.into_backend().spoken, at_most_one)
    })
}

proptest! {
    #[test]
    fn prompts_are_sent_in_enqueue_order(steps in prop::collection::vec(step(), 0..40)) {
        let (enqueued, spoken, at_most_one) = run(steps, None);
        prop_assert!(at_most_one);
        prop_assert_eq!(spoken, enqueued);
    }

    #[test]
    fn dispatch_failures_keep_order(
        steps in prop::collection::vec(step(), 0..40),
        fail_every in 2usize..5,
    ) {
        let (enqueued, spoken, at_most_one) = run(steps, Some(fail_every));
        prop_assert!(at_most_one);
        // failed dispatches are not retried, so every prompt is tried exactly once
        prop_assert_eq!(spoken, enqueued);
    }
}
