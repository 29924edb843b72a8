//! The flattened route table and its conversion into an axum router.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use axum::Router;
use futures::FutureExt;
use tower::util::BoxCloneSyncService;

use crate::action::{BoundAction, Route};
use crate::context::ActionContext;
use crate::error::{ActionError, ResolveError};
use crate::layer::{self, RouteService, SubtreeLayer};
use crate::method::{HttpMethod, Methods};
use crate::middleware::{Endpoint, Middleware, Next};
use crate::problem::ProblemResponse;
use crate::response::translate;
use crate::validation::ValidationGate;

/// Largest request body read into a context, unless overridden.
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// A route with its absolute path and the middleware and layers of its
/// subtree.
#[derive(Debug, Clone)]
pub struct BoundRoute {
    path: String,
    methods: Methods,
    gate: ValidationGate,
    action: BoundAction,
    middleware: Arc<[Middleware]>,
    layers: Arc<[SubtreeLayer]>,
}

impl BoundRoute {
    pub(crate) fn new(
        path: String,
        route: Route,
        middleware: Arc<[Middleware]>,
        layers: Arc<[SubtreeLayer]>,
    ) -> Self {
        Self {
            path,
            methods: route.methods,
            gate: route.gate,
            action: route.action,
            middleware,
            layers,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn methods(&self) -> &Methods {
        &self.methods
    }

    pub fn gate(&self) -> &ValidationGate {
        &self.gate
    }

    pub fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }

    pub fn layers(&self) -> &[SubtreeLayer] {
        &self.layers
    }

    /// HTTP service dispatching into this route, wrapped in its layers.
    fn service(self: Arc<Self>, body_limit: usize) -> RouteService {
        let layers = self.layers.clone();
        let inner = BoxCloneSyncService::new(tower::service_fn(move |req: Request| {
            let route = self.clone();
            async move { Ok::<_, Infallible>(dispatch(route, req, body_limit).await) }
        }));
        layer::wrap(inner, &layers)
    }

    /// Innermost link of the chain: validation gate, action, translator.
    fn endpoint(&self) -> Endpoint {
        let gate = self.gate.clone();
        let action = self.action.clone();
        Arc::new(move |ctx: ActionContext| {
            let gate = gate.clone();
            let action = action.clone();
            async move {
                gate.check(&ctx).await?;
                let reply = action.call(ctx.clone()).await?;
                translate(reply, &ctx);
                Ok::<(), ActionError>(())
            }
            .boxed()
        })
    }
}

/// Ordered routes, unique per (path, method). Paths that only differ in
/// parameter names are rejected, since the router cannot tell them apart.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<BoundRoute>,
    seen: HashSet<(HttpMethod, String)>,
    shapes: HashMap<String, String>,
    body_limit: usize,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            seen: HashSet::new(),
            shapes: HashMap::new(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub(crate) fn push(&mut self, route: BoundRoute) -> Result<(), ResolveError> {
        let shape = route_shape(&route.path);
        match self.shapes.get(&shape) {
            Some(existing) if *existing != route.path => {
                return Err(ResolveError::ConflictingPattern {
                    path: route.path.clone(),
                    existing: existing.clone(),
                });
            }
            Some(_) => {}
            None => {
                self.shapes.insert(shape, route.path.clone());
            }
        }

        for method in route.methods.iter() {
            if !self.seen.insert((method, route.path.clone())) {
                return Err(ResolveError::DuplicateRoute {
                    method,
                    path: route.path.clone(),
                });
            }
        }
        self.routes.push(route);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundRoute> {
        self.routes.iter()
    }

    pub fn find(&self, method: HttpMethod, path: &str) -> Option<&BoundRoute> {
        self.routes
            .iter()
            .find(|r| r.path == path && r.methods.contains(method))
    }

    /// Absolute paths in resolution order; a path served by several routes
    /// appears once per route.
    pub fn paths(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.path.as_str()).collect()
    }

    /// Maximum number of body bytes read per request.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn into_router<S>(self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.register(Router::new())
    }

    /// Add every route to an existing router. The router must not already
    /// serve any of the table's paths.
    pub fn register<S>(self, mut router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let body_limit = self.body_limit;
        let mut order: Vec<String> = Vec::new();
        let mut by_path: HashMap<String, MethodRouter<S>> = HashMap::new();

        for route in self.routes {
            let route = Arc::new(route);
            let entry = by_path.entry(route.path.clone()).or_insert_with(|| {
                order.push(route.path.clone());
                MethodRouter::new()
            });
            let service = route.clone().service(body_limit);
            for method in route.methods.iter() {
                *entry = std::mem::replace(entry, MethodRouter::new())
                    .on_service(method.filter(), service.clone());
            }
        }

        for path in order {
            if let Some(method_router) = by_path.remove(&path) {
                router = router.route(&path, method_router);
            }
        }
        router
    }
}

/// `/users/{id}` and `/users/{user_id}` share the shape `/users/{}`.
fn route_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with("{*") {
                "{*}"
            } else if segment.starts_with('{') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

impl<'a> IntoIterator for &'a RouteTable {
    type Item = &'a BoundRoute;
    type IntoIter = std::slice::Iter<'a, BoundRoute>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.iter()
    }
}

async fn dispatch(route: Arc<BoundRoute>, req: Request, body_limit: usize) -> Response {
    let instance = req.uri().path().to_string();
    let ctx = match ActionContext::from_request(req, &route.path, body_limit).await {
        Ok(ctx) => ctx,
        Err(err) => {
            err.log(&instance);
            return ProblemResponse(err.to_problem(&instance)).into_response();
        }
    };

    let next = Next::new(route.middleware.clone(), route.endpoint());
    match next.run(ctx.clone()).await {
        Ok(()) => ctx.take_response().into_response(),
        Err(err) => {
            err.log(&instance);
            ProblemResponse(err.to_problem(&instance)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_ignore_parameter_names() {
        assert_eq!(route_shape("/users/{id}"), "/users/{}");
        assert_eq!(route_shape("/users/{user_id}/files/{*rest}"), "/users/{}/files/{*}");
        assert_eq!(route_shape("/users/me"), "/users/me");
    }
}
