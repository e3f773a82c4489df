//! Notification contract and the explicit pending-notification buffer.

use std::any::Any;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::EventError;

/// A domain notification: an immutable fact raised by an aggregate.
///
/// Notifications carry only the data downstream handlers need (names, emails,
/// identifiers, language codes). The stable `EVENT_TYPE` key must survive
/// refactors: it is persisted with the payload and used to look up the
/// deserializer later, so treat it like a wire format and version it
/// (e.g. `"accounts.user_registered.v1"`). A schema change is a new key.
pub trait DomainNotification:
    Serialize + DeserializeOwned + Clone + core::fmt::Debug + Send + Sync + 'static
{
    /// Stable, versioned type key for this notification.
    const EVENT_TYPE: &'static str;

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }
}

/// Object-safe view of a notification, used after polymorphic deserialization.
///
/// The dispatch layer downcasts back to the concrete type via `as_any`.
pub trait ErasedNotification: Send + Sync + core::fmt::Debug {
    fn event_type(&self) -> &'static str;

    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

impl<N: DomainNotification> ErasedNotification for N {
    fn event_type(&self) -> &'static str {
        N::EVENT_TYPE
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}

/// A notification that has been serialized for durable staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedNotification {
    pub event_type: &'static str,
    pub payload: serde_json::Value,
}

/// Explicit staging buffer for pending notifications.
///
/// Aggregates own one of these and record into it from business operations.
/// Serialization happens at record time, so a payload that cannot serialize
/// fails the business operation itself; nothing half-recorded can reach a
/// commit. The buffer has no durability of its own: the persistence layer
/// drains it (`take`) and writes outbox rows in the same transaction as the
/// business change.
#[derive(Debug, Clone, Default)]
pub struct NotificationBuffer {
    staged: Vec<StagedNotification>,
}

impl NotificationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize and stage a notification, preserving append order.
    pub fn record<N: DomainNotification>(&mut self, notification: &N) -> Result<(), EventError> {
        let payload = serde_json::to_value(notification).map_err(|source| EventError::Serialize {
            event_type: N::EVENT_TYPE,
            source,
        })?;
        self.staged.push(StagedNotification {
            event_type: N::EVENT_TYPE,
            payload,
        });
        Ok(())
    }

    /// Drain all staged notifications, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<StagedNotification> {
        std::mem::take(&mut self.staged)
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

/// Implemented by aggregates that stage notifications for the outbox.
pub trait RaisesNotifications {
    fn notifications_mut(&mut self) -> &mut NotificationBuffer;
}
