//! Job polling state machine
//!
//! One routine serves every job kind: wait a fixed period, fetch a fresh
//! snapshot, report it, then decide whether to stop. Ticks are strictly
//! serialized. There is no retry limit and no backoff; the service moves a
//! stuck job to `Timed Out` by itself.

use super::{RemoteJob, Transition};
use crate::error::{AsdkError, AsdkResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Source of fresh job snapshots
#[async_trait]
pub trait JobFetcher<J: RemoteJob>: Send + Sync {
    /// Fetch the current state of `job` from its self URL
    async fn fetch_snapshot(&self, job: &J) -> AsdkResult<J>;
}

/// Polling parameters
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Delay before each status check
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(asdk_common::config::DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl From<&asdk_common::config::PollingConfig> for PollOptions {
    fn from(config: &asdk_common::config::PollingConfig) -> Self {
        Self {
            interval: config.interval(),
        }
    }
}

/// Poll `job` until it reaches a terminal state
///
/// `on_progress` sees every fetched snapshot, terminal ones included, before
/// the transition is evaluated.
///
/// Resolves with the `Completed` snapshot. Fails with `JobFailed` on `Failed`
/// or `Timed Out`, with the transport error if a fetch fails, and with
/// `Cancelled` once `cancel` fires. Cancellation only cuts the wait between
/// ticks; a fetch already in flight runs to completion and is still reported.
pub async fn poll_job<J, F, P>(
    fetcher: &F,
    job: &J,
    options: &PollOptions,
    cancel: &CancellationToken,
    mut on_progress: P,
) -> AsdkResult<J>
where
    J: RemoteJob,
    F: JobFetcher<J> + ?Sized,
    P: FnMut(&J) + Send,
{
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(kind = J::KIND, url = %job.url(), tick, "Polling cancelled");
                return Err(AsdkError::Cancelled);
            }
            _ = tokio::time::sleep(options.interval) => {}
        }

        tick += 1;

        let snapshot = match fetcher.fetch_snapshot(job).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    kind = J::KIND,
                    url = %job.url(),
                    tick,
                    error = %e,
                    "Job status check failed"
                );
                return Err(e);
            }
        };

        on_progress(&snapshot);

        let status = snapshot.status();
        match status.transition() {
            Transition::Resolve => {
                info!(kind = J::KIND, url = %snapshot.url(), tick, "Job completed");
                return Ok(snapshot);
            }
            Transition::Reject => {
                warn!(kind = J::KIND, url = %snapshot.url(), status = %status, tick, "Job failed");
                let snapshot_json = serde_json::to_value(&snapshot)
                    .unwrap_or(serde_json::Value::Null);
                return Err(AsdkError::JobFailed {
                    status: status.clone(),
                    snapshot: Box::new(snapshot_json),
                });
            }
            Transition::Continue => {
                if let super::JobStatus::Unknown(raw) = status {
                    warn!(
                        kind = J::KIND,
                        url = %snapshot.url(),
                        status = %raw,
                        "Unknown job status"
                    );
                } else {
                    debug!(
                        kind = J::KIND,
                        status = %status,
                        progress = snapshot.progress(),
                        tick,
                        "Job still running"
                    );
                }
            }
        }
    }
}
