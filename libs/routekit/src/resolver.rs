//! Flattening of factory trees into a route table.

use std::sync::Arc;

use crate::error::ResolveError;
use crate::factory::{FactoryNode, RouteFactory};
use crate::layer::SubtreeLayer;
use crate::middleware::Middleware;
use crate::table::{BoundRoute, RouteTable};

/// Deepest nesting accepted before the tree is treated as unbounded.
pub const MAX_DEPTH: usize = 64;

#[derive(Clone, Copy)]
struct Ancestor {
    addr: usize,
    factory: &'static str,
}

struct Frame {
    node: Arc<dyn FactoryNode>,
    prefix: String,
    middleware: Arc<[Middleware]>,
    layers: Arc<[SubtreeLayer]>,
    ancestors: Vec<Ancestor>,
}

/// Resolve a factory tree rooted at `root`.
pub async fn resolve<F: RouteFactory>(root: F) -> Result<RouteTable, ResolveError> {
    resolve_node(Arc::new(root)).await
}

/// Resolve an already erased factory tree.
///
/// Factories are activated depth-first, each factory's own routes before
/// those of its children, children in declaration order. A factory reached
/// twice is activated twice, unless it is reached again below itself.
pub async fn resolve_node(root: Arc<dyn FactoryNode>) -> Result<RouteTable, ResolveError> {
    let mut table = RouteTable::new();
    let mut stack = vec![Frame {
        node: root,
        prefix: String::new(),
        middleware: Arc::from(Vec::new()),
        layers: Arc::from(Vec::new()),
        ancestors: Vec::new(),
    }];

    while let Some(frame) = stack.pop() {
        let factory = frame.node.type_name();
        let this = Ancestor {
            addr: Arc::as_ptr(&frame.node).cast::<()>() as usize,
            factory,
        };
        check_ancestry(this, &frame.ancestors)?;

        let routes = frame.node.activate().await?;
        let prefix = join_prefix(&frame.prefix, &frame.node.prefix_segment(), factory)?;
        let middleware = extend(frame.middleware, frame.node.subtree_middleware());
        let layers = extend(frame.layers, frame.node.subtree_layers());

        for route in routes {
            let path = join_path(&prefix, &route.path, factory)?;
            if route.methods.is_empty() {
                return Err(ResolveError::EmptyMethods { factory, path });
            }
            tracing::debug!(
                %path,
                methods = %route.methods,
                factory,
                middleware = middleware.len(),
                layers = layers.len(),
                "resolved route"
            );
            table.push(BoundRoute::new(
                path,
                route,
                middleware.clone(),
                layers.clone(),
            ))?;
        }

        let mut ancestors = frame.ancestors;
        ancestors.push(this);
        for child in frame.node.children().into_iter().rev() {
            stack.push(Frame {
                node: child,
                prefix: prefix.clone(),
                middleware: middleware.clone(),
                layers: layers.clone(),
                ancestors: ancestors.clone(),
            });
        }
    }

    tracing::info!(routes = table.len(), "route table resolved");
    Ok(table)
}

/// A node may not sit below itself. Fresh instances of a self-nesting type
/// have distinct addresses, so past [`MAX_DEPTH`] a repeated type counts as
/// a cycle too.
fn check_ancestry(this: Ancestor, ancestors: &[Ancestor]) -> Result<(), ResolveError> {
    let factory = this.factory;
    if ancestors.iter().any(|a| a.addr == this.addr) {
        return Err(ResolveError::Cycle { factory });
    }
    if ancestors.len() >= MAX_DEPTH {
        if ancestors.iter().any(|a| a.factory == factory) {
            return Err(ResolveError::Cycle { factory });
        }
        return Err(ResolveError::TooDeep {
            factory,
            limit: MAX_DEPTH,
        });
    }
    Ok(())
}

fn extend<T: Clone>(inherited: Arc<[T]>, own: Vec<T>) -> Arc<[T]> {
    if own.is_empty() {
        inherited
    } else {
        inherited.iter().cloned().chain(own).collect()
    }
}

pub(crate) fn join_prefix(
    inherited: &str,
    segment: &str,
    factory: &'static str,
) -> Result<String, ResolveError> {
    if segment.is_empty() {
        return Ok(inherited.to_string());
    }
    if !segment.starts_with('/') {
        return Err(ResolveError::InvalidPrefix {
            factory,
            prefix: segment.to_string(),
        });
    }
    Ok(format!("{inherited}{}", segment.trim_end_matches('/')))
}

pub(crate) fn join_path(
    prefix: &str,
    path: &str,
    factory: &'static str,
) -> Result<String, ResolveError> {
    let invalid = |path: String, reason: &'static str| ResolveError::InvalidPath {
        factory,
        path,
        reason,
    };
    if !path.starts_with('/') {
        return Err(invalid(path.to_string(), "paths must start with '/'"));
    }
    let full = if path == "/" && !prefix.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}{path}")
    };
    match check_segments(&full) {
        Ok(()) => Ok(full),
        Err(reason) => Err(invalid(full, reason)),
    }
}

/// Parameters are whole segments, `{name}` or a trailing `{*name}`.
fn check_segments(path: &str) -> Result<(), &'static str> {
    let mut segments = path.split('/').skip(1).peekable();
    while let Some(segment) = segments.next() {
        if segment.starts_with(':') {
            return Err("':name' segments are not supported, use '{name}'");
        }
        if !segment.contains(['{', '}']) {
            continue;
        }
        let name = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .map(|s| s.strip_prefix('*').unwrap_or(s))
            .ok_or("parameters must span a whole segment")?;
        if name.is_empty() || name.contains(['{', '}', '*']) {
            return Err("malformed parameter name");
        }
        if segment.starts_with("{*") && segments.peek().is_some() {
            return Err("catch-all parameters must be the last segment");
        }
    }
    Ok(())
}
