//! The factory tree served by the binary.
//!
//! ```text
//! /api                      ApiRoot     (propagate_errors, extract_api_fields)
//! ├── /api/db/...           DbRouter    shared connection flag
//! └── /api/notes/...        NotesRouter in-memory store, validated bodies
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use parking_lot::RwLock;
use routekit::schema::{integer, object};
use routekit::{
    api_fields, bind_route_actions, extract_api_fields, load_schema, nest, propagate_errors,
    ActionContext, ActionError, FactoryNode, HttpMethod, Middleware, Projected, Raw, Reply, Route,
    RouteDefinition, RouteFactory, Schema, SchemaError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub struct ApiRoot {
    notes: Arc<NotesRouter>,
}

impl ApiRoot {
    /// Build the tree; request schemas are looked up in `schemas_dir`.
    pub fn new(schemas_dir: &Path) -> Result<Self, SchemaError> {
        Ok(Self {
            notes: Arc::new(NotesRouter::new(schemas_dir)?),
        })
    }
}

#[async_trait]
impl RouteFactory for ApiRoot {
    type Dependencies = ();

    fn prefix(&self) -> &str {
        "/api"
    }

    async fn dependencies(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn middleware(&self) -> Vec<Middleware> {
        vec![propagate_errors(), extract_api_fields()]
    }

    fn nested(&self) -> Vec<Arc<dyn FactoryNode>> {
        vec![nest(DbRouter), self.notes.clone() as Arc<dyn FactoryNode>]
    }

    fn create(&self, _deps: Arc<()>) -> Vec<Route> {
        vec![Route::new(HttpMethod::Get, "/", |_ctx: ActionContext| async {
            Ok::<_, ActionError>(json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }))
        })]
    }
}

// ---------------------------------------------------------------------------
// /db

/// Stand-in for a pooled connection: only tracks whether it is up.
pub struct Database {
    connected: AtomicBool,
}

impl Database {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub struct DbRouter;

#[async_trait]
impl RouteFactory for DbRouter {
    type Dependencies = Database;

    fn prefix(&self) -> &str {
        "/db"
    }

    async fn dependencies(&self) -> anyhow::Result<Database> {
        tracing::debug!("opening demo database");
        Ok(Database {
            connected: AtomicBool::new(true),
        })
    }

    fn create(&self, db: Arc<Database>) -> Vec<Route> {
        bind_route_actions(
            db,
            [
                RouteDefinition::get("/status", db_status),
                RouteDefinition::post("/connect", db_connect),
                RouteDefinition::post("/disconnect", db_disconnect),
            ],
        )
    }
}

async fn db_status(db: Arc<Database>, _ctx: ActionContext) -> Result<Value, ActionError> {
    Ok(json!({ "connected": db.is_connected() }))
}

async fn db_connect(db: Arc<Database>, _ctx: ActionContext) -> Result<Value, ActionError> {
    db.connected.store(true, Ordering::SeqCst);
    Ok(json!({ "connected": true }))
}

async fn db_disconnect(db: Arc<Database>, _ctx: ActionContext) -> Result<bool, ActionError> {
    db.connected.store(false, Ordering::SeqCst);
    Ok(false)
}

// ---------------------------------------------------------------------------
// /notes

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub revision: u64,
}

api_fields!(Note, exclude ["revision"]);

#[derive(Debug, Deserialize)]
struct NoteInput {
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Default)]
pub struct NoteStore {
    notes: RwLock<BTreeMap<u64, Note>>,
    last_id: AtomicU64,
}

impl NoteStore {
    fn insert(&self, input: NoteInput) -> Note {
        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        let note = Note {
            id,
            title: input.title,
            body: input.body,
            tags: input.tags,
            revision: 1,
        };
        self.notes.write().insert(id, note.clone());
        note
    }

    fn update(&self, id: u64, input: NoteInput) -> Option<Note> {
        let mut notes = self.notes.write();
        let note = notes.get_mut(&id)?;
        note.title = input.title;
        note.body = input.body;
        note.tags = input.tags;
        note.revision += 1;
        Some(note.clone())
    }

    fn get(&self, id: u64) -> Option<Note> {
        self.notes.read().get(&id).cloned()
    }

    fn list(&self, limit: usize) -> Vec<Note> {
        self.notes.read().values().take(limit).cloned().collect()
    }

    fn remove(&self, id: u64) -> Option<Note> {
        self.notes.write().remove(&id)
    }
}

/// Used when the schema directory has no `note` document.
fn builtin_note_schema() -> Value {
    json!({
        "type": "object",
        "required": ["title"],
        "additionalProperties": false,
        "properties": {
            "title": { "type": "string", "minLength": 1, "maxLength": 200 },
            "body": { "type": "string" },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "uniqueItems": true
            }
        }
    })
}

fn note_schema(dir: &Path) -> Result<Schema, SchemaError> {
    match load_schema("note", dir) {
        Err(SchemaError::NotFound { .. }) => {
            tracing::debug!(dir = %dir.display(), "no note schema on disk, using the built-in one");
            Schema::json(builtin_note_schema())
        }
        other => other,
    }
}

const MAX_PAGE: usize = 100;

pub struct NotesRouter {
    note: Schema,
    page: Schema,
}

impl NotesRouter {
    pub fn new(schemas_dir: &Path) -> Result<Self, SchemaError> {
        Ok(Self {
            note: note_schema(schemas_dir)?,
            page: object()
                .field("limit", integer().min(1).max(MAX_PAGE as f64))
                .no_unknown()
                .into(),
        })
    }
}

#[async_trait]
impl RouteFactory for NotesRouter {
    type Dependencies = NoteStore;

    fn prefix(&self) -> &str {
        "/notes"
    }

    async fn dependencies(&self) -> anyhow::Result<NoteStore> {
        Ok(NoteStore::default())
    }

    fn create(&self, store: Arc<NoteStore>) -> Vec<Route> {
        bind_route_actions(
            store,
            [
                RouteDefinition::get("/", list_notes).query_schema(self.page.clone()),
                RouteDefinition::post("/", create_note).body_schema(self.note.clone()),
                RouteDefinition::get("/{id}", get_note),
                RouteDefinition::get("/{id}/raw", get_note_raw),
                RouteDefinition::put("/{id}", update_note).body_schema(self.note.clone()),
                RouteDefinition::delete("/{id}", delete_note),
            ],
        )
    }
}

fn note_id(ctx: &ActionContext) -> Result<u64, ActionError> {
    let raw = ctx.param("id").unwrap_or_default();
    raw.parse()
        .map_err(|_| ActionError::bad_request(format!("'{raw}' is not a note id")))
}

fn missing(id: u64) -> ActionError {
    ActionError::not_found(format!("note {id} does not exist"))
}

async fn list_notes(store: Arc<NoteStore>, ctx: ActionContext) -> Result<Reply, ActionError> {
    let limit = ctx
        .query_param("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(MAX_PAGE);
    Reply::entity(&store.list(limit))
}

async fn create_note(
    store: Arc<NoteStore>,
    ctx: ActionContext,
) -> Result<Projected<Note>, ActionError> {
    let note = store.insert(ctx.body_as()?);
    tracing::info!(id = note.id, "note created");

    ctx.set_status(StatusCode::CREATED);
    if let Ok(location) = HeaderValue::from_str(&format!("{}/{}", ctx.path(), note.id)) {
        ctx.set_header(header::LOCATION, location);
    }
    Ok(Projected(note))
}

async fn get_note(store: Arc<NoteStore>, ctx: ActionContext) -> Result<Projected<Note>, ActionError> {
    let id = note_id(&ctx)?;
    store.get(id).map(Projected).ok_or_else(|| missing(id))
}

async fn get_note_raw(store: Arc<NoteStore>, ctx: ActionContext) -> Result<Raw<Note>, ActionError> {
    let id = note_id(&ctx)?;
    store.get(id).map(Raw).ok_or_else(|| missing(id))
}

async fn update_note(
    store: Arc<NoteStore>,
    ctx: ActionContext,
) -> Result<Projected<Note>, ActionError> {
    let id = note_id(&ctx)?;
    store
        .update(id, ctx.body_as()?)
        .map(Projected)
        .ok_or_else(|| missing(id))
}

async fn delete_note(store: Arc<NoteStore>, ctx: ActionContext) -> Result<bool, ActionError> {
    let id = note_id(&ctx)?;
    match store.remove(id) {
        Some(_) => Ok(false),
        None => Err(missing(id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use axum::Router;
    use routekit::resolve;
    use tower::ServiceExt;

    async fn app(dir: &Path) -> Router {
        resolve(ApiRoot::new(dir).unwrap())
            .await
            .unwrap()
            .into_router()
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Option<Value>) {
        let mut req = Request::builder().method(method).uri(uri);
        if body.is_some() {
            req = req.header(header::CONTENT_TYPE, "application/json");
        }
        let req = req
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = (!bytes.is_empty()).then(|| serde_json::from_slice(&bytes).unwrap());
        (status, headers, body)
    }

    #[tokio::test]
    async fn tree_resolves_to_expected_paths() {
        let dir = tempfile::tempdir().unwrap();
        let table = resolve(ApiRoot::new(dir.path()).unwrap()).await.unwrap();
        assert_eq!(
            table.paths(),
            vec![
                "/api",
                "/api/db/status",
                "/api/db/connect",
                "/api/db/disconnect",
                "/api/notes",
                "/api/notes",
                "/api/notes/{id}",
                "/api/notes/{id}/raw",
                "/api/notes/{id}",
                "/api/notes/{id}",
            ]
        );
    }

    #[tokio::test]
    async fn note_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (status, headers, body) = send(
            &app,
            Method::POST,
            "/api/notes",
            Some(json!({ "title": "first", "tags": ["a"] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers[header::LOCATION], "/api/notes/1");
        assert_eq!(
            body,
            Some(json!({ "id": 1, "title": "first", "body": "", "tags": ["a"] }))
        );

        let (status, _, body) = send(
            &app,
            Method::PUT,
            "/api/notes/1",
            Some(json!({ "title": "renamed" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["title"], "renamed");

        let (_, _, body) = send(&app, Method::GET, "/api/notes/1/raw", None).await;
        assert_eq!(body.unwrap()["revision"], 2);

        let (status, _, body) = send(&app, Method::DELETE, "/api/notes/1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, None);

        let (status, _, body) = send(&app, Method::GET, "/api/notes/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.unwrap()["detail"], "note 1 does not exist");
    }

    #[tokio::test]
    async fn list_is_projected_and_paged() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        for title in ["a", "b", "c"] {
            send(&app, Method::POST, "/api/notes", Some(json!({ "title": title }))).await;
        }

        let (status, _, body) = send(&app, Method::GET, "/api/notes?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        let items = body.unwrap();
        let items = items.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|n| n.get("revision").is_none()));

        let (status, _, _) = send(&app, Method::GET, "/api/notes?limit=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _, _) = send(&app, Method::GET, "/api/notes?page=2", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_notes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (status, _, body) =
            send(&app, Method::POST, "/api/notes", Some(json!({ "body": "x" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.unwrap()["code"], "VALIDATION_ERROR");

        let (status, _, _) = send(
            &app,
            Method::POST,
            "/api/notes",
            Some(json!({ "title": "t", "extra": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(&app, Method::GET, "/api/notes/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn schema_on_disk_replaces_builtin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("note.yml"),
            "type: object\nrequired: [title, body]\n",
        )
        .unwrap();
        let app = app(dir.path()).await;

        let (status, _, _) =
            send(&app, Method::POST, "/api/notes", Some(json!({ "title": "t" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _, _) = send(
            &app,
            Method::POST,
            "/api/notes",
            Some(json!({ "title": "t", "body": "b" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn disconnect_is_visible_to_status() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (_, _, body) = send(&app, Method::GET, "/api/db/status", None).await;
        assert_eq!(body, Some(json!({ "connected": true })));

        let (status, _, _) = send(&app, Method::POST, "/api/db/disconnect", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, _, body) = send(&app, Method::GET, "/api/db/status", None).await;
        assert_eq!(body, Some(json!({ "connected": false })));

        let (status, _, _) = send(&app, Method::GET, "/api/db/disconnect", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn index_reports_name() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;
        let (status, _, body) = send(&app, Method::GET, "/api", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["name"], "routekit-server");
    }
}
