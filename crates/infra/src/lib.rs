//! `signalbox-infra` — durable outbox, polling, and job execution.
//!
//! The delivery half of the notification pipeline:
//!
//! 1. [`outbox::NotificationCapture`] drains staged notifications from
//!    aggregates into outbox rows, committed with the business change.
//! 2. [`outbox::OutboxPoller`] claims due rows (skip-locked) and enqueues
//!    them as jobs, with bounded retry and quarantine on repeated failure.
//! 3. [`jobs::JobRunner`] consumes jobs and redispatches through
//!    [`relay::EventRelay`], which decodes payloads and publishes them to
//!    the in-process mediator.
//!
//! Delivery is at-least-once end to end; handlers are idempotent.

pub mod jobs;
pub mod outbox;
pub mod relay;


pub use jobs::{
    BackoffStrategy, EventJob, InMemoryJobQueue, JobQueue, JobQueueError, JobRunner, RetryPolicy,
};
pub use outbox::{
    ClaimedBatch, InMemoryOutboxStore, NotificationCapture, OutboxMessage, OutboxPoller,
    OutboxStore, OutboxStoreError, PollerConfig, PostgresOutboxStore,
};
pub use relay::{EventRelay, RelayError};
