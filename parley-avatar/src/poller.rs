//! Status Poller for render jobs
//!
//! Polls at a fixed interval until the job reaches a terminal status, the
//! attempt budget runs out, or the cancellation token fires. The token is
//! checked before every request and raced against every wait.

use crate::client::AvatarServiceClient;
use crate::error::{AvatarError, Result};
use crate::wire::RenderStatus;
use parley_core::config::PollConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollBudget {
    Bounded(u32),
    Unbounded,
}

impl From<&PollConfig> for PollBudget {
    fn from(config: &PollConfig) -> Self {
        if config.unbounded {
            PollBudget::Unbounded
        } else {
            PollBudget::Bounded(config.max_attempts)
        }
    }
}

#[derive(Clone)]
pub struct StatusPoller {
    client: Arc<dyn AvatarServiceClient>,
    interval: Duration,
    budget: PollBudget,
}

impl StatusPoller {
    pub fn new(client: Arc<dyn AvatarServiceClient>, interval: Duration, budget: PollBudget) -> Self {
        Self {
            client,
            interval,
            budget,
        }
    }

    pub fn from_config(client: Arc<dyn AvatarServiceClient>, config: &PollConfig) -> Self {
        Self::new(client, config.interval(), PollBudget::from(config))
    }

    pub fn budget(&self) -> PollBudget {
        self.budget
    }

    /// Poll `job_id` until it completes, returning the result URL
    pub async fn poll(&self, job_id: &str, cancel: &CancellationToken) -> Result<String> {
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                info!(job_id, attempts, "poll cancelled");
                return Err(AvatarError::Cancelled);
            }

            attempts += 1;
            let observed = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(job_id, attempts, "poll cancelled");
                    return Err(AvatarError::Cancelled);
                }
                observed = self.client.poll_render_job(job_id) => observed,
            };

            match observed {
                Ok(job) => match job.status {
                    RenderStatus::Completed => {
                        return match job.result_url {
                            Some(url) => {
                                info!(job_id, attempts, "render completed");
                                Ok(url)
                            }
                            None => Err(AvatarError::GenerationFailed(
                                "completed without result url".to_string(),
                            )),
                        };
                    }
                    RenderStatus::Failed => {
                        let message = job
                            .message
                            .unwrap_or_else(|| "render failed".to_string());
                        warn!(job_id, attempts, message = %message, "render failed");
                        return Err(AvatarError::GenerationFailed(message));
                    }
                    status => debug!(job_id, attempts, ?status, "render pending"),
                },
                Err(e) if e.is_retryable() => {
                    warn!(job_id, attempts, error = %e, "poll attempt failed, will retry");
                }
                Err(e) => return Err(e),
            }

            if let PollBudget::Bounded(max) = self.budget {
                if attempts >= max {
                    warn!(job_id, attempts, "poll budget exhausted");
                    return Err(AvatarError::Timeout(format!(
                        "render job {} not finished after {} attempts",
                        job_id, attempts
                    )));
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(job_id, attempts, "poll cancelled");
                    return Err(AvatarError::Cancelled);
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Run a poll on its own task
    pub fn spawn(&self, job_id: String, cancel: CancellationToken) -> PollHandle {
        let poller = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move { poller.poll(&job_id, &token).await });
        PollHandle { cancel, join }
    }
}

/// A poll running in the background
pub struct PollHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<String>>,
}

impl PollHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) -> Result<String> {
        match self.join.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(AvatarError::Cancelled),
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockAvatarServiceClient;
    use crate::wire::RenderJob;

    fn job(status: RenderStatus, url: Option<&str>, message: Option<&str>) -> RenderJob {
        RenderJob {
            job_id: "job-1".to_string(),
            status,
            result_url: url.map(str::to_string),
            message: message.map(str::to_string),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_poll_times_out() {
        let mut mock = MockAvatarServiceClient::new();
        mock.expect_poll_render_job()
            .times(3)
            .returning(|_| Ok(job(RenderStatus::Processing, None, None)));

        let poller = StatusPoller::new(Arc::new(mock), Duration::from_secs(2), PollBudget::Bounded(3));
        let result = poller.poll("job-1", &CancellationToken::new()).await;
        assert!(matches!(result, Err(AvatarError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_consumes_attempt() {
        let mut mock = MockAvatarServiceClient::new();
        let mut calls = 0;
        mock.expect_poll_render_job().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(AvatarError::ProviderUnavailable("reset".into()))
            } else {
                Ok(job(RenderStatus::Completed, Some("https://cdn/clip.mp4"), None))
            }
        });

        let poller = StatusPoller::new(Arc::new(mock), Duration::from_secs(2), PollBudget::Bounded(2));
        let url = poller.poll("job-1", &CancellationToken::new()).await.unwrap();
        assert_eq!(url, "https://cdn/clip.mp4");
    }

    #[tokio::test]
    async fn test_rejection_propagates() {
        let mut mock = MockAvatarServiceClient::new();
        mock.expect_poll_render_job()
            .times(1)
            .returning(|_| Err(AvatarError::ProviderRejected("unknown job".into())));

        let poller = StatusPoller::new(Arc::new(mock), Duration::from_millis(1), PollBudget::Unbounded);
        assert!(matches!(
            poller.poll("job-1", &CancellationToken::new()).await,
            Err(AvatarError::ProviderRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_completed_without_url() {
        let mut mock = MockAvatarServiceClient::new();
        mock.expect_poll_render_job()
            .returning(|_| Ok(job(RenderStatus::Completed, None, None)));

        let poller = StatusPoller::new(Arc::new(mock), Duration::from_millis(1), PollBudget::Bounded(5));
        match poller.poll("job-1", &CancellationToken::new()).await {
            Err(AvatarError::GenerationFailed(m)) => assert_eq!(m, "completed without result url"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_first_request() {
        let mock = MockAvatarServiceClient::new();
        let poller = StatusPoller::new(Arc::new(mock), Duration::from_millis(1), PollBudget::Unbounded);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            poller.poll("job-1", &token).await,
            Err(AvatarError::Cancelled)
        ));
    }

    #[test]
    fn test_budget_from_config() {
        let mut config = PollConfig::default();
        assert_eq!(PollBudget::from(&config), PollBudget::Bounded(12));
        config.unbounded = true;
        assert_eq!(PollBudget::from(&config), PollBudget::Unbounded);
    }
}
