//! Translating action results into HTTP responses.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use crate::context::ActionContext;
use crate::error::ActionError;
use crate::problem::{Problem, ProblemResponse, APPLICATION_PROBLEM_JSON};
use crate::projection::{ApiFields, FieldSelection, Projected, Raw};

/// A JSON body waiting to be written, optionally tagged with a field
/// selection for the projection middleware.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    value: Value,
    selection: Option<FieldSelection>,
    raw: bool,
}

impl Payload {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            selection: None,
            raw: false,
        }
    }

    pub fn selected(value: Value, selection: FieldSelection) -> Self {
        Self {
            value,
            selection: Some(selection),
            raw: false,
        }
    }

    /// A payload the projection middleware must leave alone.
    pub fn raw(value: Value) -> Self {
        Self {
            value,
            selection: None,
            raw: true,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn selection(&self) -> Option<&FieldSelection> {
        self.selection.as_ref()
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Apply the tagged selection, if any. Raw payloads are untouched.
    pub(crate) fn project(&mut self) {
        if self.raw {
            return;
        }
        if let Some(selection) = self.selection.take() {
            let value = std::mem::take(&mut self.value);
            self.value = selection.apply(value);
        }
    }
}

/// What an action produced, after conversion through [`IntoReply`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Nothing was returned (`()`, `None`).
    Empty,
    /// An explicit "no content" result (`false`).
    NoContent,
    Json(Payload),
}

impl Reply {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, ActionError> {
        Ok(Reply::Json(Payload::new(serde_json::to_value(value)?)))
    }

    /// A payload tagged with the field selection of `T`.
    pub fn entity<T: ApiFields + Serialize>(value: &T) -> Result<Self, ActionError> {
        Ok(Reply::Json(Payload::selected(
            serde_json::to_value(value)?,
            T::api_fields(),
        )))
    }

    pub fn raw<T: Serialize + ?Sized>(value: &T) -> Result<Self, ActionError> {
        Ok(Reply::Json(Payload::raw(serde_json::to_value(value)?)))
    }
}

/// Conversion of action return values into a [`Reply`].
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, ActionError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Ok(self)
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Ok(Reply::Empty)
    }
}

impl IntoReply for bool {
    fn into_reply(self) -> Result<Reply, ActionError> {
        if self {
            Ok(Reply::Json(Payload::new(Value::Bool(true))))
        } else {
            Ok(Reply::NoContent)
        }
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Ok(Reply::Json(Payload::new(self)))
    }
}

impl<T: IntoReply> IntoReply for Option<T> {
    fn into_reply(self) -> Result<Reply, ActionError> {
        match self {
            Some(inner) => inner.into_reply(),
            None => Ok(Reply::Empty),
        }
    }
}

impl<T: Serialize> IntoReply for axum::Json<T> {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Reply::json(&self.0)
    }
}

impl<T: ApiFields + Serialize> IntoReply for Projected<T> {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Reply::entity(&self.0)
    }
}

impl<T: Serialize> IntoReply for Raw<T> {
    fn into_reply(self) -> Result<Reply, ActionError> {
        Reply::raw(&self.0)
    }
}

/// The mutable response slot of a request.
#[derive(Debug, Clone, Default)]
pub struct ResponseState {
    pub(crate) status: Option<StatusCode>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Payload>,
}

impl ResponseState {
    /// Status explicitly set so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Payload> {
        self.body.as_ref()
    }

    pub fn body_mut(&mut self) -> Option<&mut Payload> {
        self.body.as_mut()
    }

    pub fn set_body(&mut self, payload: Payload) {
        self.body = Some(payload);
    }

    pub fn take_body(&mut self) -> Option<Payload> {
        self.body.take()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Replace the slot contents with a Problem body.
    pub fn set_problem(&mut self, problem: Problem) {
        self.status = Some(problem.status_code());
        self.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(APPLICATION_PROBLEM_JSON),
        );
        self.body = Some(Payload::raw(
            serde_json::to_value(&problem).unwrap_or_default(),
        ));
    }
}

impl IntoResponse for ResponseState {
    fn into_response(self) -> Response {
        let status = self.status.unwrap_or(if self.body.is_some() {
            StatusCode::OK
        } else {
            StatusCode::NO_CONTENT
        });

        let bytes = match self.body {
            Some(payload) if status != StatusCode::NO_CONTENT => {
                match serde_json::to_vec(payload.value()) {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        tracing::error!(error = %err, "failed to serialize response body");
                        return ProblemResponse(Problem::new(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Internal Server Error",
                            "Failed to serialize response body",
                        ))
                        .into_response();
                    }
                }
            }
            _ => None,
        };

        let mut headers = self.headers;
        if bytes.is_some() && !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }

        let mut resp = match bytes {
            Some(bytes) => Response::new(Body::from(bytes)),
            None => Response::new(Body::empty()),
        };
        *resp.status_mut() = status;
        resp.headers_mut().extend(headers);
        resp
    }
}

/// Fold an action's reply into the request's response slot.
pub(crate) fn translate(reply: Reply, ctx: &ActionContext) {
    ctx.with_response(|slot| match reply {
        Reply::NoContent => {
            slot.status = Some(StatusCode::NO_CONTENT);
            slot.body = None;
        }
        Reply::Empty => {
            if slot.body.is_none() && slot.status.is_none() {
                slot.status = Some(StatusCode::NO_CONTENT);
            }
        }
        Reply::Json(payload) => {
            if slot.body.is_none() {
                slot.body = Some(payload);
            }
        }
    });
}
