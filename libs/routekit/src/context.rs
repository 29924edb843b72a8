//! Per-request context handed to middleware and actions.
//!
//! The context carries the parsed request (path parameters, query, JSON body)
//! and a response slot. Actions may write to the slot directly; whatever they
//! return is folded into it by the response translator afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequestParts, Query, RawPathParams, Request};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ActionError;
use crate::response::{Payload, ResponseState};

/// Parsed request data. Built once per request, read-only afterwards.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// The route pattern that matched, e.g. `/users/{id}`.
    pub route: String,
    pub params: HashMap<String, String>,
    pub query: Map<String, Value>,
    pub body: Option<Value>,
}

impl RequestParts {
    pub fn new(method: Method, uri: Uri) -> Self {
        let query = parse_query(&uri);
        let route = uri.path().to_string();
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            route,
            params: HashMap::new(),
            query,
            body: None,
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

struct Inner {
    request: RequestParts,
    response: Mutex<ResponseState>,
}

#[derive(Clone)]
pub struct ActionContext {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("method", &self.inner.request.method)
            .field("path", &self.inner.request.uri.path())
            .field("route", &self.inner.request.route)
            .finish_non_exhaustive()
    }
}

impl ActionContext {
    pub fn new(request: RequestParts) -> Self {
        Self {
            inner: Arc::new(Inner {
                request,
                response: Mutex::new(ResponseState::default()),
            }),
        }
    }

    /// Read the path parameters and body of a request routed through
    /// `route`.
    pub(crate) async fn from_request(
        req: Request,
        route: &str,
        body_limit: usize,
    ) -> Result<Self, ActionError> {
        let (mut parts, body) = req.into_parts();
        let params = RawPathParams::from_request_parts(&mut parts, &())
            .await
            .map_err(|rejection| ActionError::status(rejection.status(), rejection.body_text()))?;
        let params = params
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let body = read_body(&parts.headers, body, body_limit).await?;

        let mut request = RequestParts::new(parts.method, parts.uri).with_route(route);
        request.params = params;
        request.headers = parts.headers;
        request.body = body;
        Ok(Self::new(request))
    }

    pub fn method(&self) -> &Method {
        &self.inner.request.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.request.uri
    }

    pub fn path(&self) -> &str {
        self.inner.request.uri.path()
    }

    /// The route pattern this request was dispatched through.
    pub fn route(&self) -> &str {
        &self.inner.request.route
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.request.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.inner.request.params
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.request.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .request
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// Query parameters as a JSON object. A key given once maps to a string,
    /// a repeated key to an array of its strings in request order.
    pub fn query(&self) -> &Map<String, Value> {
        &self.inner.request.query
    }

    /// Value of a query key given once; `None` for missing or repeated keys.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.inner.request.query.get(name).and_then(Value::as_str)
    }

    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        serde_json::from_value(Value::Object(self.inner.request.query.clone()))
            .map_err(|e| ActionError::MalformedRequest(format!("invalid query: {e}")))
    }

    /// Parsed request body; `None` when the request carried no body.
    pub fn body(&self) -> Option<&Value> {
        self.inner.request.body.as_ref()
    }

    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        let body = self
            .body()
            .cloned()
            .ok_or_else(|| ActionError::MalformedRequest("request body is missing".into()))?;
        serde_json::from_value(body)
            .map_err(|e| ActionError::MalformedRequest(format!("invalid body: {e}")))
    }

    /// Status of the response. Kept by the translator, except when the action
    /// returns `false`, which always answers `204`.
    pub fn set_status(&self, status: StatusCode) {
        self.inner.response.lock().status = Some(status);
    }

    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        self.inner.response.lock().headers.insert(name, value);
    }

    /// Write the response body directly. A body written this way is kept by
    /// the response translator.
    pub fn set_body<T: Serialize>(&self, body: &T) -> Result<(), ActionError> {
        let value = serde_json::to_value(body)?;
        self.set_payload(Payload::new(value));
        Ok(())
    }

    pub fn set_payload(&self, payload: Payload) {
        self.inner.response.lock().body = Some(payload);
    }

    /// Snapshot of the response slot.
    pub fn response(&self) -> ResponseState {
        self.inner.response.lock().clone()
    }

    pub fn with_response<R>(&self, f: impl FnOnce(&mut ResponseState) -> R) -> R {
        f(&mut self.inner.response.lock())
    }

    pub(crate) fn take_response(&self) -> ResponseState {
        std::mem::take(&mut *self.inner.response.lock())
    }
}

async fn read_body(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<Option<Value>, ActionError> {
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| ActionError::MalformedRequest(format!("failed to read body: {e}")))?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.is_empty() || content_type.contains("json") {
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| ActionError::MalformedRequest(format!("invalid JSON body: {e}")))?;
        return Ok(Some(value));
    }

    Ok(Some(Value::String(
        String::from_utf8_lossy(&bytes).into_owned(),
    )))
}

fn parse_query(uri: &Uri) -> Map<String, Value> {
    let Ok(Query(pairs)) = Query::<Vec<(String, String)>>::try_from_uri(uri) else {
        return Map::new();
    };

    let mut query = Map::new();
    for (key, value) in pairs {
        match query.get_mut(&key) {
            None => {
                query.insert(key, Value::String(value));
            }
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(first) => *first = Value::Array(vec![first.take(), Value::String(value)]),
        }
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn ctx(uri: &str, route: &str) -> ActionContext {
        ActionContext::new(RequestParts::new(Method::GET, uri.parse().unwrap()).with_route(route))
    }

    #[test]
    fn params_are_looked_up_by_name() {
        let c = ActionContext::new(
            RequestParts::new(Method::GET, "/users/42".parse().unwrap())
                .with_route("/users/{id}")
                .with_param("id", "42"),
        );
        assert_eq!(c.param("id"), Some("42"));
        assert_eq!(c.param("other"), None);
        assert_eq!(c.route(), "/users/{id}");
    }

    #[test]
    fn static_routes_have_no_params() {
        let c = ctx("/all/top", "/all/top");
        assert!(c.params().is_empty());
    }

    #[test]
    fn repeated_query_keys_become_arrays() {
        let c = ctx("/test?x=a&y=1&x=b&x=c", "/test");
        assert_eq!(c.query().get("x"), Some(&serde_json::json!(["a", "b", "c"])));
        assert_eq!(c.query_param("y"), Some("1"));
        assert_eq!(c.query_param("x"), None);
    }

    #[test]
    fn query_values_are_strings() {
        let c = ctx("/test?x=111&y=abc", "/test");
        assert_eq!(c.query_param("x"), Some("111"));
        assert_eq!(c.query().get("y"), Some(&Value::String("abc".into())));
    }

    #[test]
    fn typed_query_and_body() {
        #[derive(Deserialize)]
        struct Q {
            x: String,
        }
        #[derive(Deserialize)]
        struct B {
            a: bool,
        }

        let c = ActionContext::new(
            RequestParts::new(Method::POST, "/t?x=1".parse().unwrap())
                .with_body(serde_json::json!({ "a": true })),
        );
        assert_eq!(c.query_as::<Q>().unwrap().x, "1");
        assert!(c.body_as::<B>().unwrap().a);
    }

    #[test]
    fn missing_body_is_malformed_for_typed_access() {
        let c = ctx("/t", "/t");
        assert!(matches!(
            c.body_as::<serde_json::Value>(),
            Err(ActionError::MalformedRequest(_))
        ));
    }

    #[test]
    fn response_slot_is_shared_between_clones() {
        let c = ctx("/t", "/t");
        let other = c.clone();
        other.set_status(StatusCode::ACCEPTED);
        other.set_body(&serde_json::json!({ "ok": true })).unwrap();

        let res = c.response();
        assert_eq!(res.status(), Some(StatusCode::ACCEPTED));
        assert!(res.has_body());
    }

    #[tokio::test]
    async fn empty_and_json_bodies() {
        let headers = HeaderMap::new();
        assert_eq!(read_body(&headers, Body::empty(), 1024).await.unwrap(), None);

        let parsed = read_body(&headers, Body::from(r#"{"a":1}"#), 1024)
            .await
            .unwrap();
        assert_eq!(parsed, Some(serde_json::json!({ "a": 1 })));

        let err = read_body(&headers, Body::from("{nope"), 1024).await;
        assert!(matches!(err, Err(ActionError::MalformedRequest(_))));
    }
}
