//! Submission and polling of asynchronous server jobs.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dropmirror_common::{Error, Result};

/// How long and how often a job is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    /// Sleep before each status check.
    pub interval_ms: u64,
    /// Status checks answered `in_progress` before giving up.
    pub max_polls: u32,
    /// Wall-clock bound on the whole loop, independent of `max_polls`.
    pub deadline_secs: Option<u64>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            max_polls: 10,
            deadline_secs: None,
        }
    }
}

impl PollPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// Answer to a job submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission<T> {
    /// The server finished synchronously.
    Complete(T),
    /// The server started a job with this id.
    Pending(String),
}

/// Answer to a status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus<T> {
    InProgress,
    Complete(T),
    Failed,
    /// Any tag this client does not know.
    Other(String),
}

/// Drives a submitted job to a terminal state.
///
/// `Submitted -> Polling -> {Complete, Failed, Unknown, TimedOut}`; a
/// synchronous completion skips polling altogether.
#[derive(Debug, Clone)]
pub struct BatchJobPoller {
    policy: PollPolicy,
}

impl BatchJobPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Wait for `submission` to finish, calling `check` once per poll.
    ///
    /// Each poll sleeps for the policy interval first. `check` is expected to
    /// re-authenticate before it talks to the server.
    ///
    /// # Errors
    /// - `AsyncJobTimeout` after `max_polls` in-progress answers or when the deadline passes
    /// - `AsyncJobFailed`, `AsyncJobUnknownStatus` from the job itself
    /// - `Cancelled` as soon as `cancel` fires
    /// - Any error returned by `check`
    pub async fn drive<T, F, Fut>(
        &self,
        submission: Submission<T>,
        cancel: &CancellationToken,
        mut check: F,
    ) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<JobStatus<T>>>,
    {
        let job_id = match submission {
            Submission::Complete(result) => return Ok(result),
            Submission::Pending(job_id) => job_id,
        };

        debug!(job_id = %job_id, "Polling async job");
        let polls = AtomicU32::new(0);
        let polling = self.poll(&job_id, cancel, &mut check, &polls);

        match self.policy.deadline() {
            Some(deadline) => match tokio::time::timeout(deadline, polling).await {
                Ok(result) => result,
                Err(_) => {
                    let polls = polls.load(Ordering::SeqCst);
                    warn!(job_id = %job_id, polls, "Async job deadline passed");
                    Err(Error::AsyncJobTimeout { polls })
                }
            },
            None => polling.await,
        }
    }

    async fn poll<T, F, Fut>(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
        check: &mut F,
        polls: &AtomicU32,
    ) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<JobStatus<T>>>,
    {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.policy.interval()) => {}
            }

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                status = check(job_id.to_string()) => status?,
            };
            let count = polls.fetch_add(1, Ordering::SeqCst) + 1;

            match status {
                JobStatus::InProgress => {
                    debug!(job_id, polls = count, "Async job in progress");
                    if count >= self.policy.max_polls {
                        warn!(job_id, polls = count, "Async job poll budget exhausted");
                        return Err(Error::AsyncJobTimeout { polls: count });
                    }
                }
                JobStatus::Complete(result) => {
                    debug!(job_id, polls = count, "Async job complete");
                    return Ok(result);
                }
                JobStatus::Failed => return Err(Error::AsyncJobFailed),
                JobStatus::Other(tag) => return Err(Error::AsyncJobUnknownStatus(tag)),
            }
        }
    }
}
