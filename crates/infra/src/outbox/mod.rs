//! Transactional outbox: message model, stores, capture, and the poller.

mod capture;
mod memory;
mod message;
mod poller;
mod postgres;
mod store;

pub use capture::NotificationCapture;
pub use memory::InMemoryOutboxStore;
pub use message::OutboxMessage;
pub use poller::{OutboxPoller, PollerConfig};
pub use postgres::PostgresOutboxStore;
pub use store::{ClaimedBatch, OutboxStore, OutboxStoreError};
