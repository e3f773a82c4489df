//! Per-dispatch ambient state: caller identity and cancellation.

use tokio_util::sync::CancellationToken;

use crate::authorize::Principal;

/// Context threaded through every send/publish call.
///
/// Cloning is cheap; the token is shared, not duplicated.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    /// Caller identity, if authenticated. `None` means anonymous; routes with
    /// an authorization policy reject anonymous callers.
    pub principal: Option<Principal>,

    /// Cooperative cancellation signal, propagated into handlers.
    pub cancel: CancellationToken,
}

impl DispatchContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_principal(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
