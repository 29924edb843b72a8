use std::fmt;
use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

use crate::method::HttpMethod;
use crate::problem::{Problem, ValidationError};

/// Fatal problems found while flattening a factory tree at startup.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid prefix '{prefix}' on {factory}: prefixes must be empty or start with '/'")]
    InvalidPrefix {
        factory: &'static str,
        prefix: String,
    },

    #[error("invalid route path '{path}' in {factory}: {reason}")]
    InvalidPath {
        factory: &'static str,
        path: String,
        reason: &'static str,
    },

    #[error("route '{path}' in {factory} declares no HTTP methods")]
    EmptyMethods { factory: &'static str, path: String },

    #[error("duplicate route {method} {path}")]
    DuplicateRoute { method: HttpMethod, path: String },

    #[error("route '{path}' conflicts with '{existing}': parameter names differ")]
    ConflictingPattern { path: String, existing: String },

    #[error("{factory} is nested inside itself")]
    Cycle { factory: &'static str },

    #[error("factory tree is nested deeper than {limit} levels at {factory}")]
    TooDeep { factory: &'static str, limit: usize },

    #[error("failed to resolve dependencies of {factory}")]
    Dependencies {
        factory: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Load-time failures of schema documents.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema file '{}' is not valid JSON", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("schema file '{}' is not valid YAML", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no schema named '{name}' in '{}'", dir.display())]
    NotFound { name: String, dir: PathBuf },

    #[error("invalid schema at '{pointer}': {reason}")]
    Invalid { pointer: String, reason: String },
}

impl SchemaError {
    pub(crate) fn invalid(pointer: &str, reason: impl Into<String>) -> Self {
        SchemaError::Invalid {
            pointer: pointer.to_string(),
            reason: reason.into(),
        }
    }
}

/// Which part of the request a schema rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPart {
    Body,
    Query,
}

impl fmt::Display for RequestPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestPart::Body => f.write_str("body"),
            RequestPart::Query => f.write_str("query"),
        }
    }
}

/// Errors raised while serving a request: by the validation gate, by body
/// parsing, or by the action itself.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("request {location} failed validation")]
    Validation {
        location: RequestPart,
        errors: Vec<ValidationError>,
    },

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("{detail}")]
    Status { status: StatusCode, detail: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ActionError {
    /// An error that renders with an explicit status code.
    pub fn status(status: StatusCode, detail: impl Into<String>) -> Self {
        ActionError::Status {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::status(StatusCode::NOT_FOUND, detail)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ActionError::Validation { .. } | ActionError::MalformedRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ActionError::Status { status, .. } => *status,
            ActionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the Problem body for this error. Internal errors never leak
    /// their message.
    pub fn to_problem(&self, instance: &str) -> Problem {
        let status = self.status_code();
        let title = status.canonical_reason().unwrap_or("Error");
        let problem = match self {
            ActionError::Validation { location, errors } => Problem::new(
                status,
                title,
                format!("Request {location} failed schema validation"),
            )
            .with_code("VALIDATION_ERROR")
            .with_errors(errors.clone()),
            ActionError::MalformedRequest(reason) => {
                Problem::new(status, title, reason.clone()).with_code("MALFORMED_REQUEST")
            }
            ActionError::Status { detail, .. } => Problem::new(status, title, detail.clone()),
            ActionError::Internal(_) => {
                Problem::new(status, title, "An internal error occurred").with_code("INTERNAL_ERROR")
            }
        };
        problem.with_instance(instance)
    }

    pub(crate) fn log(&self, instance: &str) {
        let status = self.status_code().as_u16();
        match self {
            ActionError::Internal(err) => {
                tracing::error!(%instance, status, error = ?err, "request failed")
            }
            other => tracing::warn!(%instance, status, error = %other, "request rejected"),
        }
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(e: serde_json::Error) -> Self {
        ActionError::Internal(anyhow::Error::new(e))
    }
}
