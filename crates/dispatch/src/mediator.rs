//! Explicit routing tables for requests and notifications.
//!
//! Routes are registered once at startup. A request resolves to exactly one
//! handler by its `TypeId`; a notification resolves to an ordered handler
//! list by its stable event type key, so erased payloads decoded from
//! storage dispatch through the same table as freshly published values.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use signalbox_events::{DomainNotification, ErasedNotification};

use crate::authorize::{AuthzError, Permission, authorize};
use crate::context::DispatchContext;
use crate::error::{DispatchError, DispatchResult};
use crate::request::{Request, RequestHandler};
use crate::validate::{ErasedValidator, TypedValidator, Validator};

/// Handles one notification type. Multiple handlers may subscribe to the
/// same type; each runs independently and must be idempotent, since the
/// delivery pipeline redelivers on failure.
#[async_trait]
pub trait NotificationHandler<N: Send + Sync + 'static>: Send + Sync {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, notification: &N, ctx: &DispatchContext) -> DispatchResult<()>;
}

/// Object-safe adapter so handlers for different notification types can
/// share one routing table.
#[async_trait]
trait ErasedNotificationHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle_erased(
        &self,
        notification: &(dyn Any + Send + Sync),
        ctx: &DispatchContext,
    ) -> DispatchResult<()>;
}

struct TypedNotificationHandler<N, H> {
    handler: H,
    _marker: PhantomData<fn(N)>,
}

#[async_trait]
impl<N, H> ErasedNotificationHandler for TypedNotificationHandler<N, H>
where
    N: DomainNotification,
    H: NotificationHandler<N>,
{
    fn name(&self) -> &'static str {
        self.handler.name()
    }

    async fn handle_erased(
        &self,
        notification: &(dyn Any + Send + Sync),
        ctx: &DispatchContext,
    ) -> DispatchResult<()> {
        match notification.downcast_ref::<N>() {
            Some(notification) => self.handler.handle(notification, ctx).await,
            None => Err(DispatchError::TypeMismatch),
        }
    }
}

#[derive(Default)]
struct NotificationRoute {
    policy: Option<Permission>,
    validators: Vec<Box<dyn ErasedValidator>>,
    handlers: Vec<Arc<dyn ErasedNotificationHandler>>,
}

#[derive(Default)]
struct RequestRoute {
    /// `Arc<dyn RequestHandler<R>>` behind `Any`; recovered in `send`.
    handler: Option<Box<dyn Any + Send + Sync>>,
    handler_name: &'static str,
    policy: Option<Permission>,
    validators: Vec<Box<dyn ErasedValidator>>,
}

/// In-process dispatcher with explicit registries.
///
/// Built mutably at startup, then shared immutably (typically behind `Arc`).
#[derive(Default)]
pub struct Mediator {
    requests: HashMap<TypeId, RequestRoute>,
    notifications: HashMap<&'static str, NotificationRoute>,
}

impl Mediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the single handler for a request type. Registering twice
    /// replaces the previous handler.
    pub fn register_request_handler<R, H>(&mut self, handler: H)
    where
        R: Request,
        H: RequestHandler<R> + 'static,
    {
        let route = self.requests.entry(TypeId::of::<R>()).or_default();
        route.handler_name = handler.name();
        route.handler = Some(Box::new(Arc::new(handler) as Arc<dyn RequestHandler<R>>));
    }

    /// Require a permission before the request handler runs.
    pub fn require_request_permission<R: Request>(&mut self, permission: Permission) {
        self.requests.entry(TypeId::of::<R>()).or_default().policy = Some(permission);
    }

    /// Add a validator that runs before the request handler.
    pub fn add_request_validator<R, V>(&mut self, validator: V)
    where
        R: Request,
        V: Validator<R> + 'static,
    {
        self.requests
            .entry(TypeId::of::<R>())
            .or_default()
            .validators
            .push(Box::new(TypedValidator::new(validator)));
    }

    /// Subscribe a handler to a notification type. Handlers run in
    /// registration order.
    pub fn add_notification_handler<N, H>(&mut self, handler: H)
    where
        N: DomainNotification,
        H: NotificationHandler<N> + 'static,
    {
        self.notifications
            .entry(N::EVENT_TYPE)
            .or_default()
            .handlers
            .push(Arc::new(TypedNotificationHandler::<N, H> {
                handler,
                _marker: PhantomData,
            }));
    }

    /// Require a permission before any handler for this notification runs.
    pub fn require_notification_permission<N: DomainNotification>(&mut self, permission: Permission) {
        self.notifications.entry(N::EVENT_TYPE).or_default().policy = Some(permission);
    }

    /// Add a validator that runs before any handler for this notification.
    pub fn add_notification_validator<N, V>(&mut self, validator: V)
    where
        N: DomainNotification,
        V: Validator<N> + 'static,
    {
        self.notifications
            .entry(N::EVENT_TYPE)
            .or_default()
            .validators
            .push(Box::new(TypedValidator::new(validator)));
    }

    /// Number of handlers subscribed to an event type.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.notifications
            .get(event_type)
            .map(|r| r.handlers.len())
            .unwrap_or(0)
    }

    /// Dispatch a request to its single registered handler.
    ///
    /// Pipeline: authorize, validate, invoke. Authorization and validation
    /// failures reject the request before the handler sees it.
    pub async fn send<R: Request>(
        &self,
        request: R,
        ctx: &DispatchContext,
    ) -> DispatchResult<R::Response> {
        let route = self
            .requests
            .get(&TypeId::of::<R>())
            .filter(|route| route.handler.is_some())
            .ok_or(DispatchError::NoHandler(type_name::<R>()))?;

        self.check_policy(route.policy.as_ref(), ctx)?;

        let subject: &(dyn Any + Send + Sync) = &request;
        let failures: Vec<String> = route
            .validators
            .iter()
            .flat_map(|v| v.validate_erased(subject))
            .collect();
        if !failures.is_empty() {
            return Err(DispatchError::Validation(failures));
        }

        let handler = route
            .handler
            .as_ref()
            .and_then(|boxed| boxed.downcast_ref::<Arc<dyn RequestHandler<R>>>())
            .ok_or(DispatchError::TypeMismatch)?;

        debug!(
            request = type_name::<R>(),
            handler = route.handler_name,
            "dispatching request"
        );
        let response = handler.handle(request, ctx).await?;
        debug!(
            request = type_name::<R>(),
            handler = route.handler_name,
            "request handled"
        );
        Ok(response)
    }

    /// Publish a typed notification to its subscribers.
    pub async fn publish<N: DomainNotification>(
        &self,
        notification: &N,
        ctx: &DispatchContext,
    ) -> DispatchResult<()> {
        self.publish_erased(notification, ctx).await
    }

    /// Publish a type-erased notification, as produced by the registry when
    /// decoding stored payloads.
    ///
    /// All subscribed handlers run in registration order. The first failure
    /// stops the cycle and is returned; handlers after it do not run, and a
    /// redelivery re-invokes the full list (handlers are idempotent).
    pub async fn publish_erased(
        &self,
        notification: &dyn ErasedNotification,
        ctx: &DispatchContext,
    ) -> DispatchResult<()> {
        let event_type = notification.event_type();
        let route = self
            .notifications
            .get(event_type)
            .filter(|route| !route.handlers.is_empty())
            .ok_or_else(|| DispatchError::NoSubscribers(event_type.to_string()))?;

        self.check_policy(route.policy.as_ref(), ctx)?;

        let payload = notification.as_any();
        let failures: Vec<String> = route
            .validators
            .iter()
            .flat_map(|v| v.validate_erased(payload))
            .collect();
        if !failures.is_empty() {
            return Err(DispatchError::Validation(failures));
        }

        for handler in &route.handlers {
            if ctx.cancel.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }
            debug!(event_type, handler = handler.name(), "invoking handler");
            handler
                .handle_erased(payload, ctx)
                .await
                .map_err(|err| attribute_failure(handler.name(), err))?;
            debug!(event_type, handler = handler.name(), "handler completed");
        }
        Ok(())
    }

    fn check_policy(
        &self,
        policy: Option<&Permission>,
        ctx: &DispatchContext,
    ) -> DispatchResult<()> {
        let Some(required) = policy else {
            return Ok(());
        };
        let Some(principal) = ctx.principal.as_ref() else {
            return Err(DispatchError::Unauthorized(AuthzError::Unauthenticated));
        };
        authorize(principal, required).map_err(DispatchError::Unauthorized)
    }
}

/// Attach the failing handler's name, keeping the innermost attribution if
/// the handler already produced one.
fn attribute_failure(handler: &'static str, err: DispatchError) -> DispatchError {
    match err {
        attributed @ DispatchError::Handler { .. } => attributed,
        other => DispatchError::Handler {
            handler,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde::{Deserialize, Serialize};

    use crate::authorize::Principal;

    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct PingNotification {
        message: String,
    }

    impl DomainNotification for PingNotification {
        const EVENT_TYPE: &'static str = "test.ping.v1";
    }

    struct RecordingHandler {
        label: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationHandler<PingNotification> for RecordingHandler {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn handle(
            &self,
            notification: &PingNotification,
            _ctx: &DispatchContext,
        ) -> DispatchResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, notification.message));
            if self.fail {
                return Err(DispatchError::Handler {
                    handler: self.label,
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn ping(message: &str) -> PingNotification {
        PingNotification {
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn publish_invokes_handlers_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut mediator = Mediator::new();
        mediator.add_notification_handler::<PingNotification, _>(RecordingHandler {
            label: "first",
            calls: calls.clone(),
            fail: false,
        });
        mediator.add_notification_handler::<PingNotification, _>(RecordingHandler {
            label: "second",
            calls: calls.clone(),
            fail: false,
        });

        mediator
            .publish(&ping("hi"), &DispatchContext::anonymous())
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["first:hi", "second:hi"]);
    }

    #[tokio::test]
    async fn first_failure_short_circuits_later_handlers() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut mediator = Mediator::new();
        mediator.add_notification_handler::<PingNotification, _>(RecordingHandler {
            label: "failing",
            calls: calls.clone(),
            fail: true,
        });
        mediator.add_notification_handler::<PingNotification, _>(RecordingHandler {
            label: "never",
            calls: calls.clone(),
            fail: false,
        });

        let err = mediator
            .publish(&ping("hi"), &DispatchContext::anonymous())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Handler {
                handler: "failing",
                ..
            }
        ));
        assert_eq!(*calls.lock().unwrap(), vec!["failing:hi"]);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_an_error() {
        let mediator = Mediator::new();
        let err = mediator
            .publish(&ping("hi"), &DispatchContext::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoSubscribers(t) if t == "test.ping.v1"));
    }

    #[tokio::test]
    async fn policy_rejects_anonymous_and_unprivileged_callers() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut mediator = Mediator::new();
        mediator.add_notification_handler::<PingNotification, _>(RecordingHandler {
            label: "guarded",
            calls: calls.clone(),
            fail: false,
        });
        mediator.require_notification_permission::<PingNotification>(Permission::new("ping.handle"));

        let err = mediator
            .publish(&ping("hi"), &DispatchContext::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Unauthorized(AuthzError::Unauthenticated)
        ));

        let unprivileged = Principal::new(signalbox_core::PrincipalId::new(), vec![]);
        let err = mediator
            .publish(&ping("hi"), &DispatchContext::for_principal(unprivileged))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Unauthorized(AuthzError::Forbidden(_))
        ));

        assert!(calls.lock().unwrap().is_empty());

        mediator
            .publish(
                &ping("hi"),
                &DispatchContext::for_principal(Principal::system()),
            )
            .await
            .unwrap();
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    struct NonEmptyMessage;

    impl Validator<PingNotification> for NonEmptyMessage {
        fn validate(&self, subject: &PingNotification) -> Vec<String> {
            if subject.message.is_empty() {
                vec!["message must not be empty".to_string()]
            } else {
                Vec::new()
            }
        }
    }

    struct MessageUnder10;

    impl Validator<PingNotification> for MessageUnder10 {
        fn validate(&self, subject: &PingNotification) -> Vec<String> {
            if subject.message.len() >= 10 {
                vec!["message too long".to_string()]
            } else {
                Vec::new()
            }
        }
    }

    #[tokio::test]
    async fn validators_collect_all_failures_before_rejecting() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut mediator = Mediator::new();
        mediator.add_notification_handler::<PingNotification, _>(RecordingHandler {
            label: "handler",
            calls: calls.clone(),
            fail: false,
        });
        mediator.add_notification_validator::<PingNotification, _>(NonEmptyMessage);
        mediator.add_notification_validator::<PingNotification, _>(MessageUnder10);

        // Fails the first validator only; the second still runs.
        let err = mediator
            .publish(&ping(""), &DispatchContext::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(ref f) if f.len() == 1));

        let err = mediator
            .publish(
                &ping("this message is far too long"),
                &DispatchContext::anonymous(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(ref f) if f.len() == 1));

        assert!(calls.lock().unwrap().is_empty());

        mediator
            .publish(&ping("short"), &DispatchContext::anonymous())
            .await
            .unwrap();
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_context_stops_before_handlers_run() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut mediator = Mediator::new();
        mediator.add_notification_handler::<PingNotification, _>(RecordingHandler {
            label: "handler",
            calls: calls.clone(),
            fail: false,
        });

        let ctx = DispatchContext::anonymous();
        ctx.cancel.cancel();

        let err = mediator.publish(&ping("hi"), &ctx).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
        assert!(calls.lock().unwrap().is_empty());
    }

    struct Echo {
        text: String,
    }

    impl Request for Echo {
        type Response = String;
    }

    struct EchoHandler;

    #[async_trait]
    impl RequestHandler<Echo> for EchoHandler {
        async fn handle(&self, request: Echo, _ctx: &DispatchContext) -> DispatchResult<String> {
            Ok(request.text.to_uppercase())
        }
    }

    #[tokio::test]
    async fn send_resolves_the_single_request_handler() {
        let mut mediator = Mediator::new();
        mediator.register_request_handler::<Echo, _>(EchoHandler);

        let response = mediator
            .send(
                Echo {
                    text: "hello".to_string(),
                },
                &DispatchContext::anonymous(),
            )
            .await
            .unwrap();
        assert_eq!(response, "HELLO");
    }

    #[tokio::test]
    async fn send_without_handler_is_an_error() {
        let mediator = Mediator::new();
        let err = mediator
            .send(
                Echo {
                    text: "hello".to_string(),
                },
                &DispatchContext::anonymous(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoHandler(_)));
    }
}
