use thiserror::Error;

/// Notification serialization/registry error.
#[derive(Debug, Error)]
pub enum EventError {
    /// A notification payload failed to serialize when it was recorded.
    #[error("failed to serialize notification '{event_type}': {source}")]
    Serialize {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// No deserializer is registered for the given stable type key.
    #[error("unknown event type '{0}'")]
    UnknownEventType(String),

    /// A persisted payload no longer matches the registered type's schema.
    #[error("failed to decode payload for event type '{event_type}': {source}")]
    Decode {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
