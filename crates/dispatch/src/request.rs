//! Request/response dispatch contracts.

use async_trait::async_trait;

use crate::context::DispatchContext;
use crate::error::DispatchResult;

/// A request expecting exactly one handler and a typed response.
pub trait Request: Send + Sync + 'static {
    type Response: Send + 'static;
}

/// Handles a single request type.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync {
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, request: R, ctx: &DispatchContext) -> DispatchResult<R::Response>;
}
