//! Consumes event jobs and redispatches them with bounded retry.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::jobs::queue::EventJob;
use crate::jobs::retry::RetryPolicy;
use crate::relay::EventRelay;

/// Drains the job channel and hands each job to the relay.
///
/// Failures retry in-process per the policy; a permanent failure or an
/// exhausted job is dead-lettered (logged at error level and dropped). The
/// outbox row was already marked processed at enqueue time, so a dropped
/// job is not redelivered; the error log is the operator's signal.
pub struct JobRunner {
    relay: Arc<EventRelay>,
    retry: RetryPolicy,
}

impl JobRunner {
    pub fn new(relay: Arc<EventRelay>, retry: RetryPolicy) -> Self {
        Self { relay, retry }
    }

    /// Run until the channel closes or `cancel` fires.
    pub async fn run(&self, mut jobs: mpsc::UnboundedReceiver<EventJob>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("job runner stopping");
                    break;
                }
                received = jobs.recv() => match received {
                    Some(job) => self.process(job, &cancel).await,
                    None => {
                        info!("job channel closed, job runner stopping");
                        break;
                    }
                },
            }
        }
    }

    /// Process one job to completion, dead-letter, or cancellation.
    pub async fn process(&self, job: EventJob, cancel: &CancellationToken) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self
                .relay
                .process_event(&job.event_type, &job.payload, cancel.clone())
                .await
            {
                Ok(()) => {
                    debug!(
                        message_id = %job.message_id,
                        event_type = %job.event_type,
                        attempt,
                        "job completed"
                    );
                    return;
                }
                Err(err) if err.is_permanent() => {
                    error!(
                        message_id = %job.message_id,
                        event_type = %job.event_type,
                        error = %err,
                        "permanent failure, dead-lettering job"
                    );
                    return;
                }
                Err(err) => {
                    if !self.retry.should_retry(attempt) {
                        error!(
                            message_id = %job.message_id,
                            event_type = %job.event_type,
                            attempts = attempt,
                            error = %err,
                            "retries exhausted, dead-lettering job"
                        );
                        return;
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        message_id = %job.message_id,
                        event_type = %job.event_type,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "job failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(message_id = %job.message_id, "cancelled during backoff");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
