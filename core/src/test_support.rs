//! In-memory stand-in for the remote table, used by unit tests.
//!
//! Interprets the requests `TodoClient` builds: `eq.` filters on `id` and
//! `user_id`, newest-first ordering, and `return=representation` bodies.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use tokio::sync::Notify;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::session::{Identity, SessionProvider, StaticToken};
use crate::types::{NewTodo, Todo, TodoPatch};

const EPOCH: i64 = 1_700_000_000;

#[derive(Default)]
struct Inner {
    rows: Vec<Todo>,
    next_id: u64,
    clock: i64,
    calls: Vec<HttpMethod>,
    failing: Vec<HttpMethod>,
}

#[derive(Default)]
pub(crate) struct FakeStore {
    inner: Mutex<Inner>,
    gate: Mutex<Option<Arc<Notify>>>,
    select_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeStore {
    pub(crate) fn seed(&self, id: &str, owner: &str, completed: bool, secs: i64) {
        self.inner.lock().rows.push(Todo {
            id: id.to_string(),
            text: format!("todo {id}"),
            completed,
            created_at: Utc.timestamp_opt(EPOCH + secs, 0).unwrap(),
            user_id: owner.to_string(),
        });
    }

    pub(crate) fn rows(&self) -> Vec<Todo> {
        self.inner.lock().rows.clone()
    }

    pub(crate) fn row(&self, id: &str) -> Option<Todo> {
        self.inner.lock().rows.iter().find(|t| t.id == id).cloned()
    }

    /// Change a row's text behind the client's back.
    pub(crate) fn retext(&self, id: &str, text: &str) {
        if let Some(row) = self.inner.lock().rows.iter_mut().find(|t| t.id == id) {
            row.text = text.to_string();
        }
    }

    pub(crate) fn calls(&self) -> Vec<HttpMethod> {
        self.inner.lock().calls.clone()
    }

    /// Every later request with `method` answers 500 until `heal`.
    pub(crate) fn fail(&self, method: HttpMethod) {
        self.inner.lock().failing.push(method);
    }

    pub(crate) fn heal(&self) {
        self.inner.lock().failing.clear();
    }

    /// Mutating requests wait for the returned `Notify` before being served.
    pub(crate) fn hold_mutations(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&notify));
        notify
    }

    /// Selects wait for the returned `Notify` before being served.
    pub(crate) fn hold_selects(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.select_gate.lock() = Some(Arc::clone(&notify));
        notify
    }

    pub(crate) fn release_selects(&self) {
        *self.select_gate.lock() = None;
    }

    fn serve(&self, req: HttpRequest) -> HttpResponse {
        let filters = eq_filters(&req.url);
        let matches = |t: &Todo| -> bool {
            filters.iter().all(|(k, v)| match k.as_str() {
                "id" => t.id == *v,
                "user_id" => t.user_id == *v,
                _ => true,
            })
        };

        let mut inner = self.inner.lock();
        inner.calls.push(req.method);
        if inner.failing.contains(&req.method) {
            return HttpResponse::new(500, r#"{"message":"store unavailable"}"#);
        }

        match req.method {
            HttpMethod::Get => {
                let mut rows: Vec<Todo> = inner.rows.iter().filter(|t| matches(*t)).cloned().collect();
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                HttpResponse::new(200, serde_json::to_string(&rows).unwrap())
            }
            HttpMethod::Post => {
                let input: NewTodo = serde_json::from_str(req.body.as_deref().unwrap_or("")).unwrap();
                inner.next_id += 1;
                inner.clock += 1;
                let todo = Todo {
                    id: format!("row-{}", inner.next_id),
                    text: input.text,
                    completed: input.completed,
                    created_at: Utc.timestamp_opt(EPOCH + 10_000 + inner.clock, 0).unwrap(),
                    user_id: input.user_id,
                };
                inner.rows.push(todo);
                HttpResponse::new(201, "")
            }
            HttpMethod::Patch => {
                let patch: TodoPatch = serde_json::from_str(req.body.as_deref().unwrap_or("")).unwrap();
                let mut updated = Vec::new();
                for row in inner.rows.iter_mut().filter(|t| matches(&**t)) {
                    if let Some(completed) = patch.completed {
                        row.completed = completed;
                    }
                    updated.push(row.clone());
                }
                HttpResponse::new(200, serde_json::to_string(&updated).unwrap())
            }
            HttpMethod::Delete => {
                let (removed, kept): (Vec<Todo>, Vec<Todo>) =
                    std::mem::take(&mut inner.rows).into_iter().partition(|t| matches(t));
                inner.rows = kept;
                HttpResponse::new(200, serde_json::to_string(&removed).unwrap())
            }
        }
    }
}

#[async_trait]
impl crate::transport::Transport for FakeStore {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, StoreError> {
        let gate = if request.method == HttpMethod::Get {
            self.select_gate.lock().clone()
        } else {
            self.gate.lock().clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.serve(request))
    }
}

fn eq_filters(url: &str) -> Vec<(String, String)> {
    let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter_map(|(k, v)| {
            v.strip_prefix("eq.")
                .map(|v| (k.to_string(), percent_decode_str(v).decode_utf8_lossy().into_owned()))
        })
        .collect()
}

pub(crate) fn signed_in(store: &Arc<FakeStore>, user: &str) -> Arc<SessionProvider> {
    let sessions = Arc::new(SessionProvider::new(
        &StoreConfig::new("http://store.test", "anon"),
        Arc::clone(store) as Arc<dyn crate::transport::Transport>,
    ));
    sessions.sign_in(Identity::new(user), Arc::new(StaticToken::new(format!("tok-{user}"))));
    sessions
}
