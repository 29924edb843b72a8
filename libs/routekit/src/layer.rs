//! Tower layers attached to a factory subtree.
//!
//! Unlike [`Middleware`](crate::Middleware), which runs inside the route's
//! context chain, a [`SubtreeLayer`] wraps the route's HTTP service itself,
//! so tower and tower-http layers (CORS, compression, headers) can be scoped
//! to part of the tree.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};

/// The HTTP service of a single route.
pub type RouteService = BoxCloneSyncService<Request, Response, Infallible>;

type LayerFn = dyn Fn(RouteService) -> RouteService + Send + Sync;

#[derive(Clone)]
pub struct SubtreeLayer(Arc<LayerFn>);

impl SubtreeLayer {
    /// Wrap any infallible tower layer. Fallible layers such as a timeout
    /// need an error handler (e.g. `HandleErrorLayer`) in front of them.
    pub fn new<L>(layer: L) -> Self
    where
        L: Layer<RouteService> + Send + Sync + 'static,
        L::Service: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        SubtreeLayer(Arc::new(move |inner: RouteService| {
            BoxCloneSyncService::new(layer.layer(inner).map_response(|res| res.into_response()))
        }))
    }

    pub(crate) fn apply(&self, service: RouteService) -> RouteService {
        (self.0)(service)
    }
}

impl fmt::Debug for SubtreeLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SubtreeLayer")
    }
}

/// Wrap `service` so that `layers[0]` is outermost.
pub(crate) fn wrap(service: RouteService, layers: &[SubtreeLayer]) -> RouteService {
    layers
        .iter()
        .rev()
        .fold(service, |service, layer| layer.apply(service))
}
