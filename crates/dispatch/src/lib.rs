//! `signalbox-dispatch` — in-process notification/request dispatch.
//!
//! An explicit-registry mediator: request handlers are resolved by request
//! type (exactly one), notification handlers by stable event type key (zero
//! or more, invoked in registration order). Cross-cutting authorization and
//! validation run before any handler. All registries are built once at
//! process startup; nothing is scanned or reflected at dispatch time.

pub mod authorize;
pub mod context;
pub mod error;
pub mod mediator;
pub mod request;
pub mod validate;

pub use authorize::{AuthzError, Permission, Principal, authorize};
pub use context::DispatchContext;
pub use error::{DispatchError, DispatchResult};
pub use mediator::{Mediator, NotificationHandler};
pub use request::{Request, RequestHandler};
pub use validate::Validator;
