//! Declarative route composition on top of axum.
//!
//! Routes are grouped into [`RouteFactory`] implementations. A factory has an
//! optional path prefix, resolves a dependency context once, and produces
//! routes whose actions receive that context. Factories nest; [`resolve`]
//! walks the tree and flattens it into a [`RouteTable`] with absolute paths,
//! which is then turned into an [`axum::Router`].
//!
//! Each route may carry a body and a query [`Schema`]. Failing requests are
//! answered with `400` and an RFC 9457 problem body before the action runs.
//! Action results go through [`IntoReply`]: `false` becomes `204`, nothing
//! becomes `204` unless a body or status was written, anything else is sent
//! as JSON.

pub mod action;
pub mod context;
pub mod error;
pub mod factory;
pub mod layer;
pub mod method;
pub mod middleware;
pub mod problem;
pub mod projection;
pub mod resolver;
pub mod response;
pub mod schema;
pub mod table;
pub mod validation;

pub use action::{bind_route_actions, Action, BoundAction, Merged, Route, RouteDefinition};
pub use context::{ActionContext, RequestParts};
pub use error::{ActionError, RequestPart, ResolveError, SchemaError};
pub use factory::{nest, FactoryNode, RouteFactory};
pub use layer::{RouteService, SubtreeLayer};
pub use method::{HttpMethod, Methods};
pub use middleware::{propagate_errors, Middleware, Next};
pub use problem::{Problem, ProblemResponse, ValidationError};
pub use projection::{extract_api_fields, ApiFields, FieldSelection, Projected, Raw};
pub use resolver::{resolve, resolve_node, MAX_DEPTH};
pub use response::{IntoReply, Payload, Reply, ResponseState};
pub use schema::{load_schema, JsonSchema, Schema, SchemaAdapter, ShapeSchema};
pub use table::{BoundRoute, RouteTable, DEFAULT_BODY_LIMIT};
pub use validation::ValidationGate;
