//! Route middleware, in the shape of `axum::middleware::from_fn`.
//!
//! Middleware declared by a factory wraps every route of its subtree, outer
//! factories first. The innermost link runs the validation gate, the action
//! and the response translator.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::ActionContext;
use crate::error::ActionError;

pub type ChainFuture = BoxFuture<'static, Result<(), ActionError>>;

type MiddlewareFn = dyn Fn(ActionContext, Next) -> ChainFuture + Send + Sync;

pub(crate) type Endpoint = Arc<dyn Fn(ActionContext) -> ChainFuture + Send + Sync>;

#[derive(Clone)]
pub struct Middleware(Arc<MiddlewareFn>);

impl Middleware {
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(ActionContext, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ActionError>> + Send + 'static,
    {
        Middleware(Arc::new(move |ctx: ActionContext, next: Next| {
            f(ctx, next).boxed()
        }))
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

/// The remainder of a route's middleware chain.
pub struct Next {
    chain: Arc<[Middleware]>,
    position: usize,
    endpoint: Endpoint,
}

impl Next {
    pub(crate) fn new(chain: Arc<[Middleware]>, endpoint: Endpoint) -> Self {
        Self {
            chain,
            position: 0,
            endpoint,
        }
    }

    /// Run the next middleware, or the endpoint once the chain is exhausted.
    pub async fn run(mut self, ctx: ActionContext) -> Result<(), ActionError> {
        match self.chain.get(self.position).cloned() {
            Some(Middleware(f)) => {
                self.position += 1;
                f(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// Render errors of the inner chain into the response slot as Problem
/// responses, so outer middleware always observe a response.
pub fn propagate_errors() -> Middleware {
    Middleware::from_fn(|ctx: ActionContext, next: Next| async move {
        if let Err(err) = next.run(ctx.clone()).await {
            let instance = ctx.path().to_string();
            err.log(&instance);
            let problem = err.to_problem(&instance);
            ctx.with_response(|slot| slot.set_problem(problem));
        }
        Ok(())
    })
}
