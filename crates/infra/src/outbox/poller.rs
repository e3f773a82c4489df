//! Claims due outbox rows and hands them to the job queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use signalbox_core::Clock;

use crate::jobs::{EventJob, JobQueue, RetryPolicy};

use super::store::{OutboxStore, OutboxStoreError};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Rows claimed per cycle.
    pub batch_size: usize,
    pub poll_interval: Duration,
    /// Bounds enqueue attempts per row; exhausted rows are quarantined.
    pub retry: RetryPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            poll_interval: Duration::from_secs(15),
            retry: RetryPolicy::default(),
        }
    }
}

/// Periodically moves due outbox rows onto the job queue.
///
/// Multiple pollers may run against the same store; the store's skip-locked
/// claim keeps them from double-enqueueing a row within one claim window.
/// Delivery stays at-least-once: a crash between enqueue and the batch
/// update redelivers the row on a later cycle.
pub struct OutboxPoller {
    store: Arc<dyn OutboxStore>,
    queue: Arc<dyn JobQueue>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
}

impl OutboxPoller {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        queue: Arc<dyn JobQueue>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            config,
        }
    }

    /// Run cycles at the configured interval until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("outbox poller stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.process_pending(&cancel).await {
                        // Store errors end the cycle only; the next tick
                        // starts fresh.
                        error!(error = %err, "outbox poll cycle failed");
                    }
                }
            }
        }
    }

    /// One poll cycle. Returns the number of rows enqueued.
    #[instrument(skip(self, cancel), err)]
    pub async fn process_pending(
        &self,
        cancel: &CancellationToken,
    ) -> Result<usize, OutboxStoreError> {
        let batch = self
            .store
            .claim_due(self.config.batch_size, self.clock.now())
            .await?;
        if batch.messages().is_empty() {
            return Ok(0);
        }

        let mut updates = Vec::with_capacity(batch.messages().len());
        let mut enqueued = 0usize;
        for message in batch.messages() {
            if cancel.is_cancelled() {
                // Rows not yet updated stay pending for the next cycle.
                break;
            }
            let job = EventJob {
                message_id: message.id,
                event_type: message.event_type.clone(),
                payload: message.payload.clone(),
            };
            let mut updated = message.clone();
            match self.queue.enqueue(job).await {
                Ok(()) => {
                    updated.mark_processed(self.clock.now());
                    enqueued += 1;
                }
                Err(err) => {
                    let attempt = updated.retry_count as u32 + 1;
                    if self.config.retry.should_retry(attempt) {
                        let next = self.config.retry.next_attempt_at(self.clock.now(), attempt);
                        warn!(
                            message_id = %updated.id,
                            event_type = %updated.event_type,
                            attempt,
                            error = %err,
                            "enqueue failed, scheduling retry"
                        );
                        updated.mark_enqueue_failed(err.to_string(), next);
                    } else {
                        error!(
                            message_id = %updated.id,
                            event_type = %updated.event_type,
                            attempts = attempt,
                            error = %err,
                            "enqueue attempts exhausted, quarantining message"
                        );
                        updated.quarantine(self.clock.now(), err.to_string());
                    }
                }
            }
            updates.push(updated);
        }

        batch.complete(updates).await?;
        debug!(enqueued, "outbox poll cycle complete");
        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    use signalbox_core::FixedClock;

    use crate::jobs::JobQueueError;
    use crate::outbox::{ClaimedBatch, InMemoryOutboxStore, OutboxMessage};

    use super::*;

    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<EventJob>>,
        fail: Mutex<bool>,
    }

    impl RecordingQueue {
        fn set_fail(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn enqueue(&self, job: EventJob) -> Result<(), JobQueueError> {
            if *self.fail.lock().unwrap() {
                return Err(JobQueueError::Enqueue("queue down".to_string()));
            }
            self.jobs.lock().unwrap().push(job);
            Ok(())
        }
    }

    struct Fixture {
        store: InMemoryOutboxStore,
        queue: Arc<RecordingQueue>,
        clock: Arc<FixedClock>,
        poller: OutboxPoller,
    }

    fn fixture(config: PollerConfig) -> Fixture {
        let store = InMemoryOutboxStore::new();
        let queue = Arc::new(RecordingQueue::default());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 8, 27, 12, 0, 0).unwrap(),
        ));
        let poller = OutboxPoller::new(
            Arc::new(store.clone()),
            queue.clone(),
            clock.clone(),
            config,
        );
        Fixture {
            store,
            queue,
            clock,
            poller,
        }
    }

    async fn seed(f: &Fixture, count: usize) {
        let now = f.clock.now();
        let messages = (0..count)
            .map(|n| OutboxMessage::new("test.event.v1", serde_json::json!({ "n": n }), now))
            .collect();
        f.store.append(messages).await.unwrap();
    }

    #[tokio::test]
    async fn enqueues_due_rows_and_marks_them_processed() {
        let f = fixture(PollerConfig::default());
        seed(&f, 3).await;

        let enqueued = f
            .poller
            .process_pending(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(enqueued, 3);
        assert_eq!(f.queue.jobs.lock().unwrap().len(), 3);
        assert_eq!(f.store.pending_count().await.unwrap(), 0);

        // Nothing left; the next cycle is a no-op.
        let again = f
            .poller
            .process_pending(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(again, 0);
        assert_eq!(f.queue.jobs.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn preserves_append_order_within_a_batch() {
        let f = fixture(PollerConfig::default());
        seed(&f, 5).await;

        f.poller
            .process_pending(&CancellationToken::new())
            .await
            .unwrap();
        let ns: Vec<_> = f
            .queue
            .jobs
            .lock()
            .unwrap()
            .iter()
            .map(|j| j.payload["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn respects_the_batch_size() {
        let f = fixture(PollerConfig {
            batch_size: 2,
            ..PollerConfig::default()
        });
        seed(&f, 5).await;

        assert_eq!(
            f.poller
                .process_pending(&CancellationToken::new())
                .await
                .unwrap(),
            2
        );
        assert_eq!(f.store.pending_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_enqueue_schedules_a_retry_and_later_succeeds() {
        let f = fixture(PollerConfig::default());
        seed(&f, 1).await;
        f.queue.set_fail(true);

        f.poller
            .process_pending(&CancellationToken::new())
            .await
            .unwrap();
        let row = &f.store.rows()[0];
        assert_eq!(row.retry_count, 1);
        assert_eq!(row.error.as_deref(), Some("enqueue failed: queue down"));
        assert!(row.next_attempt_at.is_some());
        assert!(row.processed_at.is_none());

        // Not due yet: the next cycle skips it.
        assert_eq!(
            f.poller
                .process_pending(&CancellationToken::new())
                .await
                .unwrap(),
            0
        );

        // Past the backoff, the queue is healthy again.
        f.queue.set_fail(false);
        f.clock.advance(chrono::TimeDelta::hours(1));
        assert_eq!(
            f.poller
                .process_pending(&CancellationToken::new())
                .await
                .unwrap(),
            1
        );
        let row = &f.store.rows()[0];
        assert!(row.processed_at.is_some());
        assert!(row.error.is_none());
        assert_eq!(row.retry_count, 1);
    }

    #[tokio::test]
    async fn exhausted_rows_are_quarantined() {
        let f = fixture(PollerConfig {
            retry: RetryPolicy::fixed(2, Duration::from_secs(1)),
            ..PollerConfig::default()
        });
        seed(&f, 1).await;
        f.queue.set_fail(true);

        for _ in 0..2 {
            f.poller
                .process_pending(&CancellationToken::new())
                .await
                .unwrap();
            f.clock.advance(chrono::TimeDelta::hours(1));
        }

        let row = &f.store.rows()[0];
        assert!(row.is_quarantined());
        assert_eq!(row.retry_count, 2);
        assert_eq!(row.error.as_deref(), Some("enqueue failed: queue down"));

        // Quarantined rows never claim again.
        assert_eq!(
            f.poller
                .process_pending(&CancellationToken::new())
                .await
                .unwrap(),
            0
        );
    }

    /// Store whose claim always fails, counting the attempts.
    #[derive(Default)]
    struct FailingStore {
        claim_attempts: std::sync::atomic::AtomicU32,
    }

    impl FailingStore {
        fn attempts(&self) -> u32 {
            self.claim_attempts.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OutboxStore for FailingStore {
        async fn append(&self, _: Vec<OutboxMessage>) -> Result<(), OutboxStoreError> {
            Ok(())
        }

        async fn claim_due(
            &self,
            _: usize,
            _: chrono::DateTime<Utc>,
        ) -> Result<Box<dyn ClaimedBatch>, OutboxStoreError> {
            self.claim_attempts
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(OutboxStoreError::Storage("outbox unavailable".to_string()))
        }

        async fn pending_count(&self) -> Result<usize, OutboxStoreError> {
            Err(OutboxStoreError::Storage("outbox unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn claim_failure_surfaces_as_an_error_without_panicking() {
        let poller = OutboxPoller::new(
            Arc::new(FailingStore::default()),
            Arc::new(RecordingQueue::default()),
            Arc::new(FixedClock::new(Utc::now())),
            PollerConfig::default(),
        );

        let err = poller
            .process_pending(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OutboxStoreError::Storage(_)));
    }

    #[tokio::test]
    async fn run_keeps_polling_past_claim_failures_until_cancelled() {
        let store = Arc::new(FailingStore::default());
        let poller = Arc::new(OutboxPoller::new(
            store.clone(),
            Arc::new(RecordingQueue::default()),
            Arc::new(FixedClock::new(Utc::now())),
            PollerConfig {
                poll_interval: Duration::from_millis(5),
                ..PollerConfig::default()
            },
        ));

        let cancel = CancellationToken::new();
        let handle = {
            let poller = poller.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.run(cancel).await })
        };

        // A failed cycle must not stop the ticker.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.attempts() < 2 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "poller stopped ticking after a claim failure"
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_stops_mid_batch_without_losing_rows() {
        let f = fixture(PollerConfig::default());
        seed(&f, 3).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let enqueued = f.poller.process_pending(&cancel).await.unwrap();
        assert_eq!(enqueued, 0);
        // Untouched rows stay pending for the next cycle.
        assert_eq!(f.store.pending_count().await.unwrap(), 3);
    }
}
