use serde_json::{Map, Value};

use crate::context::ActionContext;
use crate::error::{ActionError, RequestPart};
use crate::schema::Schema;

/// Body and query schemas checked before a route's action runs.
#[derive(Debug, Clone, Default)]
pub struct ValidationGate {
    pub(crate) body: Option<Schema>,
    pub(crate) query: Option<Schema>,
}

impl ValidationGate {
    pub fn new(body: Option<Schema>, query: Option<Schema>) -> Self {
        Self { body, query }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.query.is_none()
    }

    pub fn has_body_schema(&self) -> bool {
        self.body.is_some()
    }

    pub fn has_query_schema(&self) -> bool {
        self.query.is_some()
    }

    /// Validate the body (an absent body counts as `{}`), then the query.
    /// The first rejected part is returned with all of its errors.
    pub async fn check(&self, ctx: &ActionContext) -> Result<(), ActionError> {
        if let Some(schema) = &self.body {
            let empty = Value::Object(Map::new());
            let body = ctx.body().unwrap_or(&empty);
            let errors = schema.validate(body).await;
            if !errors.is_empty() {
                tracing::debug!(route = ctx.route(), count = errors.len(), "request body rejected");
                return Err(ActionError::Validation {
                    location: RequestPart::Body,
                    errors,
                });
            }
        }

        if let Some(schema) = &self.query {
            let query = Value::Object(ctx.query().clone());
            let errors = schema.validate(&query).await;
            if !errors.is_empty() {
                tracing::debug!(route = ctx.route(), count = errors.len(), "request query rejected");
                return Err(ActionError::Validation {
                    location: RequestPart::Query,
                    errors,
                });
            }
        }

        Ok(())
    }
}
