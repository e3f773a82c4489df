//! Postgres-backed outbox store.
//!
//! Claim exclusivity uses `FOR UPDATE SKIP LOCKED`: each claim opens a
//! transaction, locks the selected rows, and holds the transaction until the
//! batch completes. Concurrent pollers skip locked rows instead of blocking,
//! and a dropped batch rolls its transaction back, releasing the locks with
//! no writes.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use signalbox_core::MessageId;

use super::message::OutboxMessage;
use super::store::{ClaimedBatch, OutboxStore, OutboxStoreError};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS outbox_messages (
    id              UUID PRIMARY KEY,
    event_type      TEXT NOT NULL,
    payload         JSONB NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL,
    processed_at    TIMESTAMPTZ,
    error           TEXT,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    next_attempt_at TIMESTAMPTZ
)
"#;

// Partial index keeps the claim predicate cheap no matter how much
// processed history accumulates.
const CREATE_PENDING_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_outbox_messages_pending
    ON outbox_messages (next_attempt_at, created_at)
    WHERE processed_at IS NULL
"#;

const CLAIM_DUE: &str = r#"
SELECT id, event_type, payload, created_at, processed_at, error, retry_count, next_attempt_at
FROM outbox_messages
WHERE processed_at IS NULL
  AND (next_attempt_at IS NULL OR next_attempt_at <= $1)
ORDER BY created_at ASC
LIMIT $2
FOR UPDATE SKIP LOCKED
"#;

const INSERT_MESSAGE: &str = r#"
INSERT INTO outbox_messages
    (id, event_type, payload, created_at, processed_at, error, retry_count, next_attempt_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

const UPDATE_MESSAGE: &str = r#"
UPDATE outbox_messages
SET processed_at = $2, error = $3, retry_count = $4, next_attempt_at = $5
WHERE id = $1
"#;

#[derive(Debug)]
struct OutboxRow {
    id: uuid::Uuid,
    event_type: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    retry_count: i32,
    next_attempt_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for OutboxRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            processed_at: row.try_get("processed_at")?,
            error: row.try_get("error")?,
            retry_count: row.try_get("retry_count")?,
            next_attempt_at: row.try_get("next_attempt_at")?,
        })
    }
}

impl From<OutboxRow> for OutboxMessage {
    fn from(row: OutboxRow) -> Self {
        Self {
            id: MessageId::from_uuid(row.id),
            event_type: row.event_type,
            payload: row.payload,
            created_at: row.created_at,
            processed_at: row.processed_at,
            error: row.error,
            retry_count: row.retry_count,
            next_attempt_at: row.next_attempt_at,
        }
    }
}

/// Postgres [`OutboxStore`].
#[derive(Debug, Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the outbox table and its pending index if absent.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), OutboxStoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(db("create outbox table"))?;
        sqlx::query(CREATE_PENDING_INDEX)
            .execute(&self.pool)
            .await
            .map_err(db("create outbox pending index"))?;
        Ok(())
    }

    /// Append rows inside a caller-owned transaction.
    ///
    /// This is the capture path: the same transaction carries the business
    /// state change, so rows and state commit or roll back together.
    pub async fn append_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        messages: &[OutboxMessage],
    ) -> Result<(), OutboxStoreError> {
        for message in messages {
            insert_message(&mut **tx, message).await?;
        }
        Ok(())
    }
}

async fn insert_message<'e, E>(executor: E, message: &OutboxMessage) -> Result<(), OutboxStoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(INSERT_MESSAGE)
        .bind(message.id.as_uuid())
        .bind(&message.event_type)
        .bind(&message.payload)
        .bind(message.created_at)
        .bind(message.processed_at)
        .bind(&message.error)
        .bind(message.retry_count)
        .bind(message.next_attempt_at)
        .execute(executor)
        .await
        .map_err(db("insert outbox message"))?;
    Ok(())
}

#[async_trait::async_trait]
impl OutboxStore for PostgresOutboxStore {
    #[instrument(skip(self, messages), fields(count = messages.len()), err)]
    async fn append(&self, messages: Vec<OutboxMessage>) -> Result<(), OutboxStoreError> {
        let mut tx = self.pool.begin().await.map_err(db("begin append"))?;
        PostgresOutboxStore::append_in_tx(&mut tx, &messages).await?;
        tx.commit().await.map_err(db("commit append"))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Box<dyn ClaimedBatch>, OutboxStoreError> {
        let mut tx = self.pool.begin().await.map_err(db("begin claim"))?;
        let rows: Vec<OutboxRow> = sqlx::query_as(CLAIM_DUE)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&mut *tx)
            .await
            .map_err(db("claim due messages"))?;
        let messages = rows.into_iter().map(OutboxMessage::from).collect();
        Ok(Box::new(PostgresClaimedBatch { tx, messages }))
    }

    #[instrument(skip(self), err)]
    async fn pending_count(&self) -> Result<usize, OutboxStoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox_messages WHERE processed_at IS NULL")
                .fetch_one(&self.pool)
                .await
                .map_err(db("count pending messages"))?;
        Ok(count as usize)
    }
}

struct PostgresClaimedBatch {
    /// Holds the row locks; rolls back (releasing them) if dropped.
    tx: Transaction<'static, Postgres>,
    messages: Vec<OutboxMessage>,
}

#[async_trait::async_trait]
impl ClaimedBatch for PostgresClaimedBatch {
    fn messages(&self) -> &[OutboxMessage] {
        &self.messages
    }

    async fn complete(
        mut self: Box<Self>,
        updates: Vec<OutboxMessage>,
    ) -> Result<(), OutboxStoreError> {
        for update in &updates {
            sqlx::query(UPDATE_MESSAGE)
                .bind(update.id.as_uuid())
                .bind(update.processed_at)
                .bind(&update.error)
                .bind(update.retry_count)
                .bind(update.next_attempt_at)
                .execute(&mut *self.tx)
                .await
                .map_err(db("update claimed message"))?;
        }
        self.tx.commit().await.map_err(db("commit claim"))?;
        Ok(())
    }
}

fn db(operation: &'static str) -> impl FnOnce(sqlx::Error) -> OutboxStoreError {
    move |source| OutboxStoreError::Database { operation, source }
}
