//! Job supervisor: drives a submitted job to a terminal state.
//!
//! The poll loop runs under a single wall-clock budget
//! ([`tokio::time::timeout`]) and races every status call and every sleep
//! against the request's [`CancellationToken`], so a timeout or a caller
//! disconnect aborts the in-flight HTTP call together with the loop.
//! Status-check errors end the loop immediately; there are no retries.

use std::time::{Duration, Instant};

use kiara_core::job::{JobState, ProviderJob};
use tokio_util::sync::CancellationToken;

use crate::adapter::{JobHandle, JobRequest, PollStatus, ProviderAdapter};
use crate::error::ProviderError;

/// Poll cadence and budget.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Fixed delay between status checks.
    pub interval: Duration,
    /// Wall-clock budget for the whole poll loop.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1200),
            timeout: Duration::from_secs(180),
        }
    }
}

/// Successful end state of one provider job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub task_id: Option<String>,
    pub output_urls: Vec<String>,
    /// Status checks issued; zero for synchronous completions.
    pub polls: u32,
}

/// Submit `request` and, if the provider queued it, poll to completion.
pub async fn execute(
    adapter: &dyn ProviderAdapter,
    request: &JobRequest,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<JobOutcome, ProviderError> {
    let handle = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(ProviderError::Canceled { task_id: None });
        }
        result = adapter.submit(request) => result?,
    };

    match handle {
        JobHandle::Completed {
            task_id,
            output_urls,
        } => Ok(JobOutcome {
            task_id,
            output_urls,
            polls: 0,
        }),
        JobHandle::Pending { task_id } => {
            let mut job = ProviderJob::new(task_id.clone());
            let output_urls = supervise(adapter, &mut job, config, cancel).await?;
            Ok(JobOutcome {
                task_id: Some(task_id),
                output_urls,
                polls: job.polls,
            })
        }
    }
}

/// Poll `job` until the provider reports a terminal state, the budget
/// elapses, or `cancel` fires.
pub async fn supervise(
    adapter: &dyn ProviderAdapter,
    job: &mut ProviderJob,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ProviderError> {
    let started = Instant::now();
    job.transition(JobState::Polling)?;

    let looped = tokio::time::timeout(
        config.timeout,
        poll_until_terminal(adapter, job, config.interval, cancel),
    )
    .await;

    match looped {
        Ok(result) => result,
        Err(_) => {
            job.transition(JobState::TimedOut)?;
            let elapsed_secs = started.elapsed().as_secs();
            tracing::warn!(
                task_id = %job.task_id,
                polls = job.polls,
                elapsed_secs,
                "Provider job timed out",
            );
            Err(ProviderError::TimedOut {
                task_id: job.task_id.clone(),
                elapsed_secs,
            })
        }
    }
}

async fn poll_until_terminal(
    adapter: &dyn ProviderAdapter,
    job: &mut ProviderJob,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<String>, ProviderError> {
    let task_id = job.task_id.clone();
    loop {
        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancel_job(job),
            result = adapter.check_status(&task_id) => result?,
        };
        tracing::debug!(task_id = %job.task_id, poll = job.polls, status = ?status, "Polled provider job");

        match status {
            PollStatus::Pending => {}
            PollStatus::Succeeded { output_urls } => {
                job.transition(JobState::Succeeded)?;
                tracing::info!(task_id = %job.task_id, polls = job.polls, "Provider job succeeded");
                return Ok(output_urls);
            }
            PollStatus::Failed { message } => {
                job.transition(JobState::Failed)?;
                return Err(ProviderError::JobFailed {
                    task_id: job.task_id.clone(),
                    message,
                });
            }
            PollStatus::Canceled => {
                job.transition(JobState::Canceled)?;
                return Err(ProviderError::JobCanceled {
                    task_id: job.task_id.clone(),
                });
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancel_job(job),
            _ = tokio::time::sleep(interval) => {}
        }
        job.transition(JobState::Polling)?;
    }
}

fn cancel_job(job: &mut ProviderJob) -> Result<Vec<String>, ProviderError> {
    job.transition(JobState::Canceled)?;
    tracing::info!(task_id = %job.task_id, "Provider job abandoned by caller");
    Err(ProviderError::Canceled {
        task_id: Some(job.task_id.clone()),
    })
}
