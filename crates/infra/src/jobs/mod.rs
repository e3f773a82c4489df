//! Job queue boundary, retry policy, and the job runner.

mod queue;
mod retry;
mod runner;

pub use queue::{EventJob, InMemoryJobQueue, JobQueue, JobQueueError};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use runner::JobRunner;
