use thiserror::Error;

use crate::authorize::AuthzError;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Failure of a send/publish pipeline.
///
/// Authorization and validation failures are permanent rejections of the
/// dispatched value; `Handler` failures may be transient. Callers that retry
/// (the job runner) bound their attempts either way.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No request handler registered for this request type. A configuration
    /// error: surfaced loudly rather than silently doing nothing.
    #[error("no request handler registered for '{0}'")]
    NoHandler(&'static str),

    /// No notification handlers registered for this event type. An event
    /// nobody consumes is suspicious, not a no-op.
    #[error("no notification handlers registered for event type '{0}'")]
    NoSubscribers(String),

    /// The declared authorization policy denied the caller.
    #[error("unauthorized: {0}")]
    Unauthorized(#[source] AuthzError),

    /// One or more validators rejected the dispatched value.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A handler reported failure; handlers after it did not run this cycle.
    #[error("handler '{handler}' failed: {message}")]
    Handler {
        handler: &'static str,
        message: String,
    },

    /// Cancellation was requested before all handlers ran.
    #[error("dispatch cancelled")]
    Cancelled,

    /// A registered route produced a value of the wrong concrete type.
    /// Indicates registry corruption; cannot occur through the typed API.
    #[error("dispatched value did not match its registered type")]
    TypeMismatch,
}
