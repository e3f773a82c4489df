//! Decodes stored payloads and redispatches them through the mediator.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use signalbox_dispatch::{DispatchContext, DispatchError, Mediator, Principal};
use signalbox_events::NotificationRegistry;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The payload could not be turned back into a typed notification:
    /// either the type key is not registered or the JSON no longer matches
    /// the type's shape. Retrying cannot fix either.
    #[error("Could not deserialize event of type '{event_type}': {reason}")]
    Deserialize { event_type: String, reason: String },

    #[error("dispatch failed: {source}")]
    Dispatch {
        #[source]
        source: DispatchError,
    },
}

impl RelayError {
    /// Permanent failures are dead-lettered immediately instead of retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            RelayError::Deserialize { .. } => true,
            RelayError::Dispatch { source } => matches!(
                source,
                DispatchError::NoHandler(_)
                    | DispatchError::NoSubscribers(_)
                    | DispatchError::Unauthorized(_)
                    | DispatchError::Validation(_)
                    | DispatchError::TypeMismatch
            ),
        }
    }
}

/// Rehydrates one stored event and publishes it to the mediator.
///
/// Runs with no principal by default: delivery is an internal concern, and
/// notification routes normally carry no policy. `with_principal` exists for
/// deployments that do guard notification routes.
pub struct EventRelay {
    registry: NotificationRegistry,
    mediator: Arc<Mediator>,
    principal: Option<Principal>,
}

impl EventRelay {
    pub fn new(registry: NotificationRegistry, mediator: Arc<Mediator>) -> Self {
        Self {
            registry,
            mediator,
            principal: None,
        }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Decode `payload` by its stable type key and publish the result.
    ///
    /// All handlers subscribed to the type run in registration order; the
    /// first failure surfaces here and the caller redelivers.
    #[instrument(skip(self, payload, cancel), err)]
    pub async fn process_event(
        &self,
        event_type: &str,
        payload: &serde_json::Value,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<(), RelayError> {
        let notification = self.registry.decode(event_type, payload).map_err(|err| {
            RelayError::Deserialize {
                event_type: event_type.to_string(),
                reason: err.to_string(),
            }
        })?;

        let ctx = DispatchContext {
            principal: self.principal.clone(),
            cancel,
        };
        self.mediator
            .publish_erased(notification.as_ref(), &ctx)
            .await
            .map_err(|source| RelayError::Dispatch { source })
    }
}
