//! The outbox row model.

use chrono::{DateTime, Utc};

use signalbox_core::MessageId;

/// One durable outbox row: a serialized notification awaiting delivery.
///
/// Lifecycle: a row is *pending* until `processed_at` is set, which is
/// terminal. A successful enqueue sets `processed_at` and clears `error`.
/// A failed enqueue records the error and schedules the next attempt;
/// once attempts are exhausted the row is quarantined: `processed_at` set
/// with the error retained, so it never claims again but stays queryable
/// (`error IS NOT NULL AND processed_at IS NOT NULL`).
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: MessageId,
    /// Stable, versioned notification key (e.g. `accounts.user_registered.v1`).
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Failed enqueue attempts so far.
    pub retry_count: i32,
    /// Earliest time the next enqueue attempt may run. `None` means due now.
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    pub fn new(
        event_type: impl Into<String>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            event_type: event_type.into(),
            payload,
            created_at: now,
            processed_at: None,
            error: None,
            retry_count: 0,
            next_attempt_at: None,
        }
    }

    /// Whether the poller may claim this row at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.processed_at.is_none() && self.next_attempt_at.is_none_or(|at| at <= now)
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Terminal-with-error: processed so it never claims again, but the
    /// failure is retained for inspection and replay tooling.
    pub fn is_quarantined(&self) -> bool {
        self.processed_at.is_some() && self.error.is_some()
    }

    /// Record a successful enqueue. Terminal.
    pub fn mark_processed(&mut self, now: DateTime<Utc>) {
        self.processed_at = Some(now);
        self.error = None;
    }

    /// Record a failed enqueue and schedule the next attempt.
    pub fn mark_enqueue_failed(&mut self, error: impl Into<String>, next_attempt_at: DateTime<Utc>) {
        self.retry_count += 1;
        self.error = Some(error.into());
        self.next_attempt_at = Some(next_attempt_at);
    }

    /// Take the row out of rotation after exhausting its attempts. Terminal.
    pub fn quarantine(&mut self, now: DateTime<Utc>, reason: impl Into<String>) {
        self.retry_count += 1;
        self.error = Some(reason.into());
        self.processed_at = Some(now);
    }
}
