//! Request schemas.
//!
//! Every schema flavour implements [`SchemaAdapter`]; routes hold them behind
//! the shared [`Schema`] handle.

mod json;
mod loader;
mod shape;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SchemaError;
use crate::problem::ValidationError;

pub use json::JsonSchema;
pub use loader::load_schema;
pub use shape::{
    array, boolean, integer, mixed, number, object, string, ObjectShape, Regex, ShapeSchema,
};

/// Validates one JSON document. An empty result means the value conforms.
#[async_trait]
pub trait SchemaAdapter: Send + Sync {
    async fn validate(&self, value: &Value) -> Vec<ValidationError>;
}

/// Shared, read-only handle to a schema adapter.
#[derive(Clone)]
pub struct Schema(Arc<dyn SchemaAdapter>);

impl Schema {
    pub fn new(adapter: impl SchemaAdapter + 'static) -> Self {
        Schema(Arc::new(adapter))
    }

    /// Compile a JSON-Schema document.
    pub fn json(document: Value) -> Result<Self, SchemaError> {
        JsonSchema::new(document).map(Schema::from)
    }

    pub async fn validate(&self, value: &Value) -> Vec<ValidationError> {
        self.0.validate(value).await
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Schema")
    }
}

impl From<JsonSchema> for Schema {
    fn from(schema: JsonSchema) -> Self {
        Schema::new(schema)
    }
}

impl From<ShapeSchema> for Schema {
    fn from(schema: ShapeSchema) -> Self {
        Schema::new(schema)
    }
}

impl From<ObjectShape> for Schema {
    fn from(schema: ObjectShape) -> Self {
        Schema::new(ShapeSchema::from(schema))
    }
}
