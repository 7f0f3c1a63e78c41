use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub use axum::http::StatusCode;

pub const DEFAULT_ANON_KEY: &str = "anon-key";
pub const DEFAULT_TABLE: &str = "todos";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct NewTodo {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub user_id: String,
}

/// Inserts accept a single object or an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InsertBody {
    One(NewTodo),
    Many(Vec<NewTodo>),
}

#[derive(Debug, Deserialize)]
pub struct TodoPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Default)]
struct Tables {
    rows: Vec<Todo>,
    tokens: HashMap<String, String>,
    failures: Vec<(Operation, StatusCode)>,
    last_created_at: Option<DateTime<Utc>>,
}

impl Tables {
    /// Strictly increasing, so insertion order and `created_at` order agree.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }

    fn take_failure(&mut self, op: Operation) -> Result<(), ApiError> {
        match self.failures.iter().position(|(o, _)| *o == op) {
            Some(idx) => {
                let (_, status) = self.failures.remove(idx);
                tracing::debug!(?op, %status, "injected failure");
                Err(ApiError::new(status, "injected failure"))
            }
            None => Ok(()),
        }
    }
}

/// Shared in-memory table plus the credentials it accepts.
#[derive(Clone)]
pub struct MockStore {
    anon_key: String,
    table: String,
    tables: Arc<RwLock<Tables>>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new(DEFAULT_ANON_KEY, DEFAULT_TABLE)
    }
}

impl MockStore {
    pub fn new(anon_key: &str, table: &str) -> Self {
        Self {
            anon_key: anon_key.to_string(),
            table: table.to_string(),
            tables: Arc::new(RwLock::new(Tables::default())),
        }
    }

    /// Mint a bearer token that authenticates as `user_id`.
    pub async fn issue_token(&self, user_id: &str) -> String {
        let token = Uuid::new_v4().to_string();
        self.tables
            .write()
            .await
            .tokens
            .insert(token.clone(), user_id.to_string());
        token
    }

    /// The next request performing `op` is answered with `status`.
    pub async fn fail_next(&self, op: Operation, status: StatusCode) {
        self.tables.write().await.failures.push((op, status));
    }

    pub async fn seed(&self, text: &str, user_id: &str, completed: bool) -> Todo {
        let mut tables = self.tables.write().await;
        let todo = Todo {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            completed,
            created_at: tables.next_timestamp(),
            user_id: user_id.to_string(),
        };
        tables.rows.push(todo.clone());
        todo
    }

    pub async fn rows(&self) -> Vec<Todo> {
        self.tables.read().await.rows.clone()
    }

    fn check_table(&self, table: &str) -> Result<(), ApiError> {
        if table == self.table {
            Ok(())
        } else {
            Err(ApiError::new(
                StatusCode::NOT_FOUND,
                format!("relation \"{table}\" does not exist"),
            ))
        }
    }

    /// Resolve the caller. `None` is the anonymous role.
    fn authenticate(&self, tables: &Tables, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
        let apikey = headers.get("apikey").and_then(|v| v.to_str().ok());
        if apikey != Some(self.anon_key.as_str()) {
            return Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid api key"));
        }
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match bearer {
            None => Ok(None),
            Some(token) if token == self.anon_key => Ok(None),
            Some(token) => tables
                .tokens
                .get(token)
                .cloned()
                .map(Some)
                .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "invalid JWT")),
        }
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "message": self.message }))).into_response()
    }
}

/// `column=eq.value` filters from the query string.
struct Filters(Vec<(String, String)>);

impl Filters {
    fn parse(params: &HashMap<String, String>) -> Result<Self, ApiError> {
        let mut filters = Vec::new();
        for (column, value) in params {
            if column == "select" || column == "order" {
                continue;
            }
            if !matches!(column.as_str(), "id" | "text" | "completed" | "user_id") {
                return Err(ApiError::new(
                    StatusCode::BAD_REQUEST,
                    format!("column \"{column}\" does not exist"),
                ));
            }
            let value = value.strip_prefix("eq.").ok_or_else(|| {
                ApiError::new(StatusCode::BAD_REQUEST, format!("unsupported filter on {column}"))
            })?;
            filters.push((column.clone(), value.to_string()));
        }
        Ok(Filters(filters))
    }

    fn matches(&self, todo: &Todo) -> bool {
        self.0.iter().all(|(column, value)| match column.as_str() {
            "id" => todo.id == *value,
            "text" => todo.text == *value,
            "completed" => todo.completed.to_string() == *value,
            "user_id" => todo.user_id == *value,
            _ => false,
        })
    }
}

fn descending(params: &HashMap<String, String>) -> Result<bool, ApiError> {
    match params.get("order").map(String::as_str) {
        None | Some("created_at.asc") => Ok(false),
        Some("created_at.desc") => Ok(true),
        Some(other) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("unsupported order: {other}"),
        )),
    }
}

fn wants_representation(headers: &HeaderMap) -> bool {
    headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("return=representation"))
}

/// Row-level security: a caller only ever sees their own rows.
fn visible(todo: &Todo, user: Option<&str>) -> bool {
    user == Some(todo.user_id.as_str())
}

pub fn app() -> Router {
    app_with(MockStore::default())
}

pub fn app_with(store: MockStore) -> Router {
    Router::new()
        .route(
            "/rest/v1/{table}",
            get(select_rows)
                .post(insert_rows)
                .patch(update_rows)
                .delete(delete_rows),
        )
        .with_state(store)
}

pub async fn run_with(listener: TcpListener, store: MockStore) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(store)).await
}

async fn select_rows(
    State(store): State<MockStore>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Todo>>, ApiError> {
    store.check_table(&table)?;
    let filters = Filters::parse(&params)?;
    let descending = descending(&params)?;

    let mut tables = store.tables.write().await;
    let user = store.authenticate(&tables, &headers)?;
    tables.take_failure(Operation::Select)?;

    let mut rows: Vec<Todo> = tables
        .rows
        .iter()
        .filter(|t| visible(t, user.as_deref()) && filters.matches(t))
        .cloned()
        .collect();
    if descending {
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    } else {
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }
    tracing::debug!(user = ?user, count = rows.len(), "select");
    Ok(Json(rows))
}

async fn insert_rows(
    State(store): State<MockStore>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Json(body): Json<InsertBody>,
) -> Result<Response, ApiError> {
    store.check_table(&table)?;
    let inputs = match body {
        InsertBody::One(input) => vec![input],
        InsertBody::Many(inputs) => inputs,
    };

    let mut tables = store.tables.write().await;
    let user = store.authenticate(&tables, &headers)?;
    tables.take_failure(Operation::Insert)?;

    if inputs.iter().any(|input| user.as_deref() != Some(input.user_id.as_str())) {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "new row violates row-level security policy",
        ));
    }

    let mut created = Vec::with_capacity(inputs.len());
    for input in inputs {
        let todo = Todo {
            id: Uuid::new_v4().to_string(),
            text: input.text,
            completed: input.completed,
            created_at: tables.next_timestamp(),
            user_id: input.user_id,
        };
        tables.rows.push(todo.clone());
        created.push(todo);
    }
    tracing::debug!(user = ?user, count = created.len(), "insert");

    if wants_representation(&headers) {
        Ok((StatusCode::CREATED, Json(created)).into_response())
    } else {
        Ok(StatusCode::CREATED.into_response())
    }
}

async fn update_rows(
    State(store): State<MockStore>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(patch): Json<TodoPatch>,
) -> Result<Response, ApiError> {
    store.check_table(&table)?;
    let filters = Filters::parse(&params)?;

    let mut tables = store.tables.write().await;
    let user = store.authenticate(&tables, &headers)?;
    tables.take_failure(Operation::Update)?;

    let mut updated = Vec::new();
    for todo in tables
        .rows
        .iter_mut()
        .filter(|t| visible(t, user.as_deref()) && filters.matches(t))
    {
        if let Some(text) = &patch.text {
            todo.text = text.clone();
        }
        if let Some(completed) = patch.completed {
            todo.completed = completed;
        }
        updated.push(todo.clone());
    }
    tracing::debug!(user = ?user, count = updated.len(), "update");

    if wants_representation(&headers) {
        Ok(Json(updated).into_response())
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

async fn delete_rows(
    State(store): State<MockStore>,
    Path(table): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    store.check_table(&table)?;
    let filters = Filters::parse(&params)?;

    let mut tables = store.tables.write().await;
    let user = store.authenticate(&tables, &headers)?;
    tables.take_failure(Operation::Delete)?;

    let (removed, kept): (Vec<Todo>, Vec<Todo>) = std::mem::take(&mut tables.rows)
        .into_iter()
        .partition(|t| visible(t, user.as_deref()) && filters.matches(t));
    tables.rows = kept;
    tracing::debug!(user = ?user, count = removed.len(), "delete");

    if wants_representation(&headers) {
        Ok(Json(removed).into_response())
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}
