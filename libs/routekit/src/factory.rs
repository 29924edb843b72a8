//! Route factories: units that declare a prefix, resolve their dependencies
//! and produce routes, optionally nesting further factories.

use std::sync::Arc;

use async_trait::async_trait;

use crate::action::Route;
use crate::error::ResolveError;
use crate::layer::SubtreeLayer;
use crate::middleware::Middleware;

/// A declarative unit of routing.
///
/// Unit structs and stateful structs implement the same trait; state a
/// factory carries can be merged into its dependencies with
/// [`Merged`](crate::Merged).
#[async_trait]
pub trait RouteFactory: Send + Sync + 'static {
    /// Context shared by every action of this factory's own routes.
    type Dependencies: Send + Sync + 'static;

    /// Path segment prepended to this factory's routes and all nested ones.
    /// Empty, or starting with `/`.
    fn prefix(&self) -> &str {
        ""
    }

    /// Resolve the dependency context. Runs once per activation of the
    /// factory; failure aborts resolution of the whole tree.
    async fn dependencies(&self) -> anyhow::Result<Self::Dependencies>;

    /// Middleware wrapping every route of this factory's subtree.
    fn middleware(&self) -> Vec<Middleware> {
        Vec::new()
    }

    /// Tower layers wrapping the HTTP service of every route in this
    /// factory's subtree, outer factories outermost.
    fn layers(&self) -> Vec<SubtreeLayer> {
        Vec::new()
    }

    fn nested(&self) -> Vec<Arc<dyn FactoryNode>> {
        Vec::new()
    }

    fn create(&self, deps: Arc<Self::Dependencies>) -> Vec<Route>;
}

/// Object-safe view of a [`RouteFactory`], used to hold heterogeneous
/// factory trees.
#[async_trait]
pub trait FactoryNode: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn prefix_segment(&self) -> String;

    fn subtree_middleware(&self) -> Vec<Middleware>;

    fn subtree_layers(&self) -> Vec<SubtreeLayer>;

    fn children(&self) -> Vec<Arc<dyn FactoryNode>>;

    /// Resolve dependencies and create this factory's own routes.
    async fn activate(&self) -> Result<Vec<Route>, ResolveError>;
}

#[async_trait]
impl<F: RouteFactory> FactoryNode for F {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<F>()
    }

    fn prefix_segment(&self) -> String {
        self.prefix().to_string()
    }

    fn subtree_middleware(&self) -> Vec<Middleware> {
        self.middleware()
    }

    fn subtree_layers(&self) -> Vec<SubtreeLayer> {
        self.layers()
    }

    fn children(&self) -> Vec<Arc<dyn FactoryNode>> {
        self.nested()
    }

    async fn activate(&self) -> Result<Vec<Route>, ResolveError> {
        let deps = self
            .dependencies()
            .await
            .map_err(|source| ResolveError::Dependencies {
                factory: std::any::type_name::<F>(),
                source,
            })?;
        Ok(self.create(Arc::new(deps)))
    }
}

/// Erase a factory for use in [`RouteFactory::nested`].
pub fn nest<F: RouteFactory>(factory: F) -> Arc<dyn FactoryNode> {
    Arc::new(factory)
}
