//! Route definitions and binding of actions to their dependencies.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::method::{HttpMethod, Methods};
use crate::response::{IntoReply, Reply};
use crate::schema::Schema;
use crate::validation::ValidationGate;

pub type ActionFuture = BoxFuture<'static, Result<Reply, ActionError>>;

/// An action that still needs its dependency context.
pub struct Action<D> {
    f: Arc<dyn Fn(Arc<D>, ActionContext) -> ActionFuture + Send + Sync>,
}

impl<D> Clone for Action<D> {
    fn clone(&self) -> Self {
        Self { f: self.f.clone() }
    }
}

impl<D: Send + Sync + 'static> Action<D> {
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Arc<D>, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ActionError>> + Send + 'static,
        R: IntoReply,
    {
        Self {
            f: Arc::new(move |deps: Arc<D>, ctx: ActionContext| {
                let fut = f(deps, ctx);
                async move { fut.await?.into_reply() }.boxed()
            }),
        }
    }

    /// Fix the dependency context. Every call of the result receives the
    /// same `Arc`.
    pub fn bind(&self, deps: Arc<D>) -> BoundAction {
        let f = self.f.clone();
        BoundAction(Arc::new(move |ctx: ActionContext| f(deps.clone(), ctx)))
    }
}

/// An action with its dependencies bound; only needs a request context.
#[derive(Clone)]
pub struct BoundAction(Arc<dyn Fn(ActionContext) -> ActionFuture + Send + Sync>);

impl BoundAction {
    pub fn from_fn<F, Fut, R>(f: F) -> Self
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ActionError>> + Send + 'static,
        R: IntoReply,
    {
        BoundAction(Arc::new(move |ctx: ActionContext| {
            let fut = f(ctx);
            async move { fut.await?.into_reply() }.boxed()
        }))
    }

    pub fn call(&self, ctx: ActionContext) -> ActionFuture {
        (self.0)(ctx)
    }
}

impl fmt::Debug for BoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoundAction")
    }
}

/// A route as declared by a factory, before its action is bound.
pub struct RouteDefinition<D> {
    path: String,
    methods: Methods,
    gate: ValidationGate,
    action: Action<D>,
}

impl<D: Send + Sync + 'static> RouteDefinition<D> {
    pub fn new<F, Fut, R>(methods: impl Into<Methods>, path: impl Into<String>, action: F) -> Self
    where
        F: Fn(Arc<D>, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ActionError>> + Send + 'static,
        R: IntoReply,
    {
        Self {
            path: path.into(),
            methods: methods.into(),
            gate: ValidationGate::default(),
            action: Action::new(action),
        }
    }

    pub fn get<F, Fut, R>(path: impl Into<String>, action: F) -> Self
    where
        F: Fn(Arc<D>, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ActionError>> + Send + 'static,
        R: IntoReply,
    {
        Self::new(HttpMethod::Get, path, action)
    }

    pub fn post<F, Fut, R>(path: impl Into<String>, action: F) -> Self
    where
        F: Fn(Arc<D>, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ActionError>> + Send + 'static,
        R: IntoReply,
    {
        Self::new(HttpMethod::Post, path, action)
    }

    pub fn put<F, Fut, R>(path: impl Into<String>, action: F) -> Self
    where
        F: Fn(Arc<D>, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ActionError>> + Send + 'static,
        R: IntoReply,
    {
        Self::new(HttpMethod::Put, path, action)
    }

    pub fn patch<F, Fut, R>(path: impl Into<String>, action: F) -> Self
    where
        F: Fn(Arc<D>, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ActionError>> + Send + 'static,
        R: IntoReply,
    {
        Self::new(HttpMethod::Patch, path, action)
    }

    pub fn delete<F, Fut, R>(path: impl Into<String>, action: F) -> Self
    where
        F: Fn(Arc<D>, ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ActionError>> + Send + 'static,
        R: IntoReply,
    {
        Self::new(HttpMethod::Delete, path, action)
    }

    pub fn body_schema(mut self, schema: impl Into<Schema>) -> Self {
        self.gate.body = Some(schema.into());
        self
    }

    pub fn query_schema(mut self, schema: impl Into<Schema>) -> Self {
        self.gate.query = Some(schema.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &Methods {
        &self.methods
    }

    pub fn bind(self, deps: &Arc<D>) -> Route {
        Route {
            path: self.path,
            methods: self.methods,
            gate: self.gate,
            action: self.action.bind(deps.clone()),
        }
    }
}

/// Bind every definition to the same dependency context.
pub fn bind_route_actions<D, I>(deps: Arc<D>, definitions: I) -> Vec<Route>
where
    D: Send + Sync + 'static,
    I: IntoIterator<Item = RouteDefinition<D>>,
{
    definitions.into_iter().map(|def| def.bind(&deps)).collect()
}

/// A route ready for the resolver: relative path, methods, schemas and a
/// bound action.
#[derive(Clone, Debug)]
pub struct Route {
    pub(crate) path: String,
    pub(crate) methods: Methods,
    pub(crate) gate: ValidationGate,
    pub(crate) action: BoundAction,
}

impl Route {
    /// A route whose action needs no dependency context.
    pub fn new<F, Fut, R>(methods: impl Into<Methods>, path: impl Into<String>, action: F) -> Self
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ActionError>> + Send + 'static,
        R: IntoReply,
    {
        Self {
            path: path.into(),
            methods: methods.into(),
            gate: ValidationGate::default(),
            action: BoundAction::from_fn(action),
        }
    }

    pub fn body_schema(mut self, schema: impl Into<Schema>) -> Self {
        self.gate.body = Some(schema.into());
        self
    }

    pub fn query_schema(mut self, schema: impl Into<Schema>) -> Self {
        self.gate.query = Some(schema.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &Methods {
        &self.methods
    }

    pub fn action(&self) -> &BoundAction {
        &self.action
    }
}

/// Factory instance state merged with resolved dependencies. Derefs to the
/// dependencies.
#[derive(Debug)]
pub struct Merged<S, D> {
    pub state: S,
    deps: D,
}

impl<S, D> Merged<S, D> {
    pub fn new(state: S, deps: D) -> Self {
        Self { state, deps }
    }

    pub fn deps(&self) -> &D {
        &self.deps
    }
}

impl<S, D> Deref for Merged<S, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.deps
    }
}
