//! Field projection of response payloads.
//!
//! A type declares which of its serialized fields may leave the service by
//! implementing [`ApiFields`]. Returning it wrapped in [`Projected`] tags the
//! payload; the [`extract_api_fields`] middleware then filters the keys once
//! the rest of the chain has run. [`Raw`] opts a payload out.

use serde_json::{Map, Value};

use crate::middleware::{Middleware, Next};
use crate::ActionContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelection {
    /// Only these keys are kept.
    Include(Vec<String>),
    /// Every key except these is kept.
    Exclude(Vec<String>),
}

impl FieldSelection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSelection::Include(fields.into_iter().map(Into::into).collect())
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSelection::Exclude(fields.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, field: &str) -> bool {
        match self {
            FieldSelection::Include(fields) => fields.iter().any(|f| f == field),
            FieldSelection::Exclude(fields) => !fields.iter().any(|f| f == field),
        }
    }

    /// Filter the keys of an object, or of every object in an array.
    /// Other values are returned as is.
    pub fn apply(&self, value: Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.filter(map)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) => Value::Object(self.filter(map)),
                        other => other,
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    fn filter(&self, map: Map<String, Value>) -> Map<String, Value> {
        map.into_iter().filter(|(k, _)| self.allows(k)).collect()
    }
}

/// Public field list of a response type.
pub trait ApiFields {
    fn api_fields() -> FieldSelection;
}

impl<T: ApiFields> ApiFields for Vec<T> {
    fn api_fields() -> FieldSelection {
        T::api_fields()
    }
}

impl<T: ApiFields> ApiFields for Option<T> {
    fn api_fields() -> FieldSelection {
        T::api_fields()
    }
}

impl<T: ApiFields + ?Sized> ApiFields for &T {
    fn api_fields() -> FieldSelection {
        T::api_fields()
    }
}

/// Return value tagged with `T`'s field selection.
#[derive(Debug, Clone)]
pub struct Projected<T>(pub T);

/// Return value that bypasses field projection.
#[derive(Debug, Clone)]
pub struct Raw<T>(pub T);

/// Implements [`ApiFields`] for a type.
///
/// ```
/// use routekit::api_fields;
///
/// #[derive(serde::Serialize)]
/// struct User {
///     name: String,
///     password_hash: String,
/// }
///
/// api_fields!(User, exclude ["password_hash"]);
/// ```
#[macro_export]
macro_rules! api_fields {
    ($ty:ty, include [$($field:expr),* $(,)?]) => {
        impl $crate::ApiFields for $ty {
            fn api_fields() -> $crate::FieldSelection {
                $crate::FieldSelection::include([$($field),*])
            }
        }
    };
    ($ty:ty, exclude [$($field:expr),* $(,)?]) => {
        impl $crate::ApiFields for $ty {
            fn api_fields() -> $crate::FieldSelection {
                $crate::FieldSelection::exclude([$($field),*])
            }
        }
    };
}

/// Middleware that applies the field selection of a tagged payload after the
/// inner chain finished.
pub fn extract_api_fields() -> Middleware {
    Middleware::from_fn(|ctx: ActionContext, next: Next| async move {
        next.run(ctx.clone()).await?;
        ctx.with_response(|slot| {
            if let Some(payload) = slot.body_mut() {
                payload.project();
            }
        });
        Ok(())
    })
}
