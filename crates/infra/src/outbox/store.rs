//! Outbox storage contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::message::OutboxMessage;

#[derive(Debug, Error)]
pub enum OutboxStoreError {
    #[error("database error during {operation}")]
    Database {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("outbox storage error: {0}")]
    Storage(String),
}

/// Durable storage for outbox rows.
///
/// Implementations must make `claim_due` exclusive across concurrent pollers:
/// a row claimed by one batch is invisible to others until the batch
/// completes or is dropped.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Append rows. Used by capture outside an explicit transaction; the
    /// Postgres store additionally exposes `append_in_tx` so rows commit
    /// with the business change.
    async fn append(&self, messages: Vec<OutboxMessage>) -> Result<(), OutboxStoreError>;

    /// Claim up to `limit` due rows, oldest first.
    ///
    /// Returns a batch holding the claim; see [`ClaimedBatch`].
    async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Box<dyn ClaimedBatch>, OutboxStoreError>;

    /// Rows not yet processed (pending or scheduled for retry).
    async fn pending_count(&self) -> Result<usize, OutboxStoreError>;
}

/// An exclusive claim on a batch of rows.
///
/// The claim lives as long as the batch: `complete` writes the updated rows
/// and releases it; dropping the batch without completing releases the claim
/// with no writes, so a crashed poller leaks nothing.
#[async_trait]
pub trait ClaimedBatch: Send {
    fn messages(&self) -> &[OutboxMessage];

    /// Persist updated rows and release the claim.
    ///
    /// `updates` may cover a prefix of the claimed rows (a cancelled cycle
    /// stops early); unwritten rows simply stay pending.
    async fn complete(self: Box<Self>, updates: Vec<OutboxMessage>) -> Result<(), OutboxStoreError>;
}
