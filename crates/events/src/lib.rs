//! `signalbox-events` — domain notification abstractions.
//!
//! A notification is an immutable record of something that happened, raised by
//! an aggregate and consumed by out-of-transaction handlers. This crate defines
//! the notification contract, the explicit pending-notification buffer that
//! aggregates stage into, and the startup-built registry used to deserialize
//! persisted payloads back into concrete types.

pub mod error;
pub mod notification;
pub mod registry;

pub use error::EventError;
pub use notification::{
    DomainNotification, ErasedNotification, NotificationBuffer, RaisesNotifications,
    StagedNotification,
};
pub use registry::NotificationRegistry;
