//! Drains staged notifications from aggregates into outbox rows.

use std::sync::Arc;

use tracing::debug;

use signalbox_core::Clock;
use signalbox_events::RaisesNotifications;

use super::message::OutboxMessage;
use super::store::{OutboxStore, OutboxStoreError};

/// Converts an aggregate's staged notifications into outbox rows.
///
/// Row order preserves the buffer's append order, so the notifications of
/// one aggregate reach the outbox in the order they were raised. Capture
/// itself is pure conversion; durability comes from writing the rows in the
/// same transaction as the aggregate's state change (`append_in_tx` on the
/// Postgres store), or `persist` for stores without an external transaction.
pub struct NotificationCapture {
    clock: Arc<dyn Clock>,
}

impl NotificationCapture {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Drain one aggregate's buffer into rows. The buffer is left empty, so
    /// a second capture of the same aggregate yields nothing.
    pub fn drain(&self, aggregate: &mut dyn RaisesNotifications) -> Vec<OutboxMessage> {
        let now = self.clock.now();
        aggregate
            .notifications_mut()
            .take()
            .into_iter()
            .map(|staged| OutboxMessage::new(staged.event_type, staged.payload, now))
            .collect()
    }

    /// Drain several aggregates in the given order into one row list.
    pub fn drain_all<'a>(
        &self,
        aggregates: impl IntoIterator<Item = &'a mut dyn RaisesNotifications>,
    ) -> Vec<OutboxMessage> {
        aggregates
            .into_iter()
            .flat_map(|aggregate| self.drain(aggregate))
            .collect()
    }

    /// Drain and append in one step. Skips the store round-trip entirely
    /// when the buffer is empty.
    pub async fn persist(
        &self,
        aggregate: &mut dyn RaisesNotifications,
        store: &dyn OutboxStore,
    ) -> Result<usize, OutboxStoreError> {
        let messages = self.drain(aggregate);
        if messages.is_empty() {
            return Ok(0);
        }
        let count = messages.len();
        store.append(messages).await?;
        debug!(count, "captured notifications to outbox");
        Ok(count)
    }
}
