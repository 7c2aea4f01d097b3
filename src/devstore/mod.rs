//! In-process development backing store.
//!
//! Serves the REST contract the service facade consumes plus remote-entry
//! manifests, seeded from a JSON database file. Every request is captured so
//! tests can assert on network traffic.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as UrlPath, Query, Request, State};
use axum::http::{Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::loader::{RemoteEntry, MOUNT_EXPOSE};
use crate::service::{Draft, Entity, Record, RecordId};

#[derive(Debug, Error)]
pub enum DevStoreError {
    #[error("Failed to read database {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse database {path}: {source}")]
    ParseError {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to bind {addr}: {source}")]
    BindError {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Contents of the JSON database file: `{ "items": [...], "users": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    #[serde(default)]
    pub items: Vec<Record>,
    #[serde(default)]
    pub users: Vec<Record>,
}

impl Database {
    pub fn load(path: &Path) -> Result<Self, DevStoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| DevStoreError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| DevStoreError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn with_items(mut self, items: Vec<Record>) -> Self {
        self.items = items;
        self
    }

    pub fn with_users(mut self, users: Vec<Record>) -> Self {
        self.users = users;
        self
    }

    fn table(&self, entity: Entity) -> &Vec<Record> {
        match entity {
            Entity::Items => &self.items,
            Entity::Users => &self.users,
        }
    }

    fn table_mut(&mut self, entity: Entity) -> &mut Vec<Record> {
        match entity {
            Entity::Items => &mut self.items,
            Entity::Users => &mut self.users,
        }
    }

    fn max_numeric_id(&self) -> u64 {
        self.items
            .iter()
            .chain(self.users.iter())
            .filter_map(|r| match r.id {
                RecordId::Number(n) => Some(n),
                RecordId::Text(_) => None,
            })
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DevStoreOptions {
    /// Artificial latency for unfiltered `GET /items`.
    pub items_delay: Duration,
    /// Names served under `/remotes/{name}/remoteEntry.json`.
    pub remotes: Vec<String>,
}

/// A request seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
}

struct StoreState {
    db: Mutex<Database>,
    next_id: Mutex<u64>,
    requests: Mutex<Vec<CapturedRequest>>,
    remotes: HashSet<String>,
    items_delay: Duration,
}

type SharedState = Arc<StoreState>;

/// Running development store. Stops when dropped.
pub struct DevStore {
    addr: SocketAddr,
    state: SharedState,
    shutdown: watch::Sender<bool>,
}

impl DevStore {
    pub async fn start(
        bind: &str,
        db: Database,
        options: DevStoreOptions,
    ) -> Result<Self, DevStoreError> {
        let listener = TcpListener::bind(bind)
            .await
            .map_err(|e| DevStoreError::BindError {
                addr: bind.to_string(),
                source: e,
            })?;
        let addr = listener.local_addr().map_err(|e| DevStoreError::BindError {
            addr: bind.to_string(),
            source: e,
        })?;

        let next_id = db.max_numeric_id() + 1;
        let state: SharedState = Arc::new(StoreState {
            db: Mutex::new(db),
            next_id: Mutex::new(next_id),
            requests: Mutex::new(Vec::new()),
            remotes: options.remotes.into_iter().collect(),
            items_delay: options.items_delay,
        });

        let app = Router::new()
            .route("/remotes/{name}/remoteEntry.json", get(remote_entry))
            .route("/{entity}", get(list_records).post(create_record))
            .route("/{entity}/{id}", get(get_record).delete(delete_record))
            .layer(middleware::from_fn_with_state(state.clone(), capture_and_delay))
            .with_state(state.clone());

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Dev store server error");
            }
        });

        tracing::info!(%addr, "Dev store listening");
        Ok(Self {
            addr,
            state,
            shutdown,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().len()
    }

    pub fn clear_requests(&self) {
        self.state.requests.lock().clear();
    }

    /// Current contents of one table.
    pub fn records(&self, entity: Entity) -> Vec<Record> {
        self.state.db.lock().table(entity).clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for DevStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn capture_and_delay(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let slow = is_unfiltered_item_list(req.method(), req.uri());

    state.requests.lock().push(CapturedRequest {
        method: method.clone(),
        path: path.clone(),
        query,
    });
    tracing::debug!(%method, %path, "Dev store request");

    if slow && !state.items_delay.is_zero() {
        tokio::time::sleep(state.items_delay).await;
    }
    next.run(req).await
}

/// `GET /items` without a usable `q`; an empty or unparsable query counts
/// as unfiltered.
fn is_unfiltered_item_list(method: &Method, uri: &Uri) -> bool {
    if *method != Method::GET || uri.path() != "/items" {
        return false;
    }
    Query::<ListQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.q)
        .map_or(true, |q| q.is_empty())
}

fn parse_entity(segment: &str) -> Result<Entity, Response> {
    Entity::parse(segment)
        .filter(|e| e.path() == segment)
        .ok_or_else(|| not_found(format!("Unknown collection '{}'", segment)))
}

fn not_found(message: String) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    q: Option<String>,
}

async fn list_records(
    State(state): State<SharedState>,
    UrlPath(entity): UrlPath<String>,
    Query(query): Query<ListQuery>,
) -> Response {
    let entity = match parse_entity(&entity) {
        Ok(entity) => entity,
        Err(response) => return response,
    };
    let db = state.db.lock();
    let records: Vec<Record> = match query.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => db
            .table(entity)
            .iter()
            .filter(|r| r.matches_query(q))
            .cloned()
            .collect(),
        _ => db.table(entity).clone(),
    };
    Json(records).into_response()
}

async fn get_record(
    State(state): State<SharedState>,
    UrlPath((entity, id)): UrlPath<(String, String)>,
) -> Response {
    let entity = match parse_entity(&entity) {
        Ok(entity) => entity,
        Err(response) => return response,
    };
    let id = RecordId::from(id);
    let db = state.db.lock();
    match db.table(entity).iter().find(|r| r.id.matches(&id)) {
        Some(record) => Json(record.clone()).into_response(),
        None => not_found(format!("No {} with id {}", entity.singular(), id)),
    }
}

async fn create_record(
    State(state): State<SharedState>,
    UrlPath(entity): UrlPath<String>,
    Json(draft): Json<Draft>,
) -> Response {
    let entity = match parse_entity(&entity) {
        Ok(entity) => entity,
        Err(response) => return response,
    };
    let id = {
        let mut next = state.next_id.lock();
        let id = *next;
        *next += 1;
        id
    };
    let record = Record {
        id: RecordId::Number(id),
        name: draft.name,
        extra: draft.extra,
    };
    state.db.lock().table_mut(entity).push(record.clone());
    tracing::debug!(%entity, id, "Dev store created record");
    (StatusCode::CREATED, Json(record)).into_response()
}

async fn delete_record(
    State(state): State<SharedState>,
    UrlPath((entity, id)): UrlPath<(String, String)>,
) -> Response {
    let entity = match parse_entity(&entity) {
        Ok(entity) => entity,
        Err(response) => return response,
    };
    let id = RecordId::from(id);
    let mut db = state.db.lock();
    let table = db.table_mut(entity);
    match table.iter().position(|r| r.id.matches(&id)) {
        Some(index) => {
            table.remove(index);
            Json(serde_json::json!({})).into_response()
        }
        None => not_found(format!("No {} with id {}", entity.singular(), id)),
    }
}

async fn remote_entry(
    State(state): State<SharedState>,
    UrlPath(name): UrlPath<String>,
) -> Response {
    if !state.remotes.contains(&name) {
        return not_found(format!("Unknown remote '{}'", name));
    }
    Json(RemoteEntry {
        name,
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        exposes: vec![MOUNT_EXPOSE.to_string()],
    })
    .into_response()
}
