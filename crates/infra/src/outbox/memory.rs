//! In-memory outbox store for tests and single-process setups.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use signalbox_core::MessageId;

use super::message::OutboxMessage;
use super::store::{ClaimedBatch, OutboxStore, OutboxStoreError};

#[derive(Default)]
struct Inner {
    rows: Vec<OutboxMessage>,
    claimed: HashSet<MessageId>,
}

/// In-memory [`OutboxStore`].
///
/// Claim exclusivity is a claimed-id set shared with each outstanding batch;
/// dropping a batch releases its ids, mirroring how an abandoned database
/// transaction releases its row locks.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, for assertions.
    pub fn rows(&self) -> Vec<OutboxMessage> {
        self.inner.lock().unwrap().rows.clone()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn append(&self, messages: Vec<OutboxMessage>) -> Result<(), OutboxStoreError> {
        self.inner.lock().unwrap().rows.extend(messages);
        Ok(())
    }

    async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Box<dyn ClaimedBatch>, OutboxStoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut messages: Vec<OutboxMessage> = inner
            .rows
            .iter()
            .filter(|m| m.is_due(now) && !inner.claimed.contains(&m.id))
            .cloned()
            .collect();
        // Oldest first, like the Postgres claim's ORDER BY; the stable sort
        // keeps insertion order for equal timestamps.
        messages.sort_by_key(|m| m.created_at);
        messages.truncate(limit);
        for m in &messages {
            inner.claimed.insert(m.id);
        }
        let ids = messages.iter().map(|m| m.id).collect();
        Ok(Box::new(InMemoryClaimedBatch {
            store: Arc::clone(&self.inner),
            ids,
            messages,
        }))
    }

    async fn pending_count(&self) -> Result<usize, OutboxStoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|m| m.processed_at.is_none())
            .count())
    }
}

struct InMemoryClaimedBatch {
    store: Arc<Mutex<Inner>>,
    ids: Vec<MessageId>,
    messages: Vec<OutboxMessage>,
}

#[async_trait]
impl ClaimedBatch for InMemoryClaimedBatch {
    fn messages(&self) -> &[OutboxMessage] {
        &self.messages
    }

    async fn complete(
        mut self: Box<Self>,
        updates: Vec<OutboxMessage>,
    ) -> Result<(), OutboxStoreError> {
        let mut inner = self.store.lock().unwrap();
        for update in updates {
            if let Some(row) = inner.rows.iter_mut().find(|r| r.id == update.id) {
                *row = update;
            }
        }
        for id in self.ids.drain(..) {
            inner.claimed.remove(&id);
        }
        Ok(())
    }
}

impl Drop for InMemoryClaimedBatch {
    fn drop(&mut self) {
        if self.ids.is_empty() {
            return;
        }
        if let Ok(mut inner) = self.store.lock() {
            for id in self.ids.drain(..) {
                inner.claimed.remove(&id);
            }
        }
    }
}
