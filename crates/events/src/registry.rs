//! Polymorphic deserialization registry.
//!
//! Built once at process startup: every notification variant the process can
//! handle registers its stable type key and a deserialization function. The
//! relay looks payloads up by key at runtime, with no reflection and no scanning in
//! the hot path. New event types extend the pipeline by adding one
//! `register::<N>()` call.

use std::collections::HashMap;

use crate::error::EventError;
use crate::notification::{DomainNotification, ErasedNotification};

type DecodeFn = fn(&serde_json::Value) -> Result<Box<dyn ErasedNotification>, EventError>;

/// Maps stable event type keys to deserializers.
#[derive(Default)]
pub struct NotificationRegistry {
    decoders: HashMap<&'static str, DecodeFn>,
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a notification type under its stable key.
    ///
    /// Re-registering the same type is a no-op (the decoder is identical).
    pub fn register<N: DomainNotification>(&mut self) {
        self.decoders.insert(N::EVENT_TYPE, decode_as::<N>);
    }

    /// Reconstruct a notification from its persisted form.
    pub fn decode(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<Box<dyn ErasedNotification>, EventError> {
        let decode = self
            .decoders
            .get(event_type)
            .ok_or_else(|| EventError::UnknownEventType(event_type.to_string()))?;
        decode(payload)
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

fn decode_as<N: DomainNotification>(
    payload: &serde_json::Value,
) -> Result<Box<dyn ErasedNotification>, EventError> {
    let notification: N =
        serde_json::from_value(payload.clone()).map_err(|source| EventError::Decode {
            event_type: N::EVENT_TYPE,
            source,
        })?;
    Ok(Box::new(notification))
}
