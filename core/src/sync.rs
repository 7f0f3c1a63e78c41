//! Local todo list kept consistent with the remote table.
//!
//! # Design
//! Toggle and delete edit the local list before their request is sent, so a
//! view re-rendered right after the call sees the change immediately. When
//! the store rejects the request, the list is rebuilt by a fresh `load`
//! rather than by undoing the edit; the error is returned only after that
//! reload finished. Add never fabricates a local row: it inserts, then loads
//! to pick up the store-assigned id and timestamp.
//!
//! State lives behind one `parking_lot::RwLock` that is never held across an
//! `.await`. A load swaps the whole list under a single write, so observers
//! never see a partial result.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{StoreError, SyncError};
use crate::session::{RemoteTodos, SessionProvider};
use crate::state::{owned_newest_first, Mutation, TodoState};
use crate::types::Todo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    Load,
    Refresh,
}

/// Fetches started and not yet finished, per kind. The state flags are
/// derived from these so an overlapping fetch cannot clear another's flag.
#[derive(Debug, Default)]
struct InFlight {
    loads: usize,
    refreshes: usize,
}

impl InFlight {
    fn counter(&mut self, kind: LoadKind) -> &mut usize {
        match kind {
            LoadKind::Load => &mut self.loads,
            LoadKind::Refresh => &mut self.refreshes,
        }
    }

    fn publish(&self, state: &mut TodoState) {
        state.is_loading = self.loads > 0;
        state.is_refreshing = self.refreshes > 0;
    }
}

/// Counts one fetch as in flight until dropped, including when the fetch
/// future is cancelled.
struct FetchGuard<'a> {
    sync: &'a TodoSynchronizer,
    kind: LoadKind,
}

impl<'a> FetchGuard<'a> {
    fn start(sync: &'a TodoSynchronizer, kind: LoadKind) -> Self {
        let mut state = sync.state.write();
        let mut in_flight = sync.in_flight.lock();
        *in_flight.counter(kind) += 1;
        in_flight.publish(&mut state);
        state.error = None;
        Self { sync, kind }
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.sync.state.write();
        let mut in_flight = self.sync.in_flight.lock();
        *in_flight.counter(self.kind) -= 1;
        in_flight.publish(&mut state);
    }
}

/// Owns the list for the current identity. Clones share the same state.
#[derive(Clone)]
pub struct TodoSynchronizer {
    session: Arc<SessionProvider>,
    state: Arc<RwLock<TodoState>>,
    in_flight: Arc<Mutex<InFlight>>,
}

impl TodoSynchronizer {
    pub fn new(session: Arc<SessionProvider>) -> Self {
        Self {
            session,
            state: Arc::new(RwLock::new(TodoState::default())),
            in_flight: Arc::new(Mutex::new(InFlight::default())),
        }
    }

    pub fn session(&self) -> &SessionProvider {
        &self.session
    }

    /// Current state as a view should render it. Rows loaded for a
    /// different identity than the one signed in now are never returned.
    pub fn snapshot(&self) -> TodoState {
        let current = self.session.current_user();
        let mut state = self.state.read().clone();
        if state.owner.as_deref() != current.as_ref().map(|u| u.id.as_str()) {
            state.todos.clear();
        }
        state
    }

    pub fn todos(&self) -> Vec<Todo> {
        self.snapshot().todos
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().is_loading
    }

    pub fn error(&self) -> Option<String> {
        self.state.read().error.clone()
    }

    /// Replace the list with the store's rows for the signed-in user.
    ///
    /// Failures land in `error` and leave the previous list in place.
    /// Signed out, this only clears `is_loading`.
    pub async fn load(&self) {
        self.fetch(LoadKind::Load).await;
    }

    /// Same as `load`, but flags `is_refreshing` so the view can keep the
    /// list on screen under a refresh indicator.
    pub async fn refresh(&self) {
        self.fetch(LoadKind::Refresh).await;
    }

    /// Call after sign-in, sign-out or a user switch.
    pub async fn session_changed(&self) {
        let current = self.session.current_user().map(|u| u.id);
        {
            let mut state = self.state.write();
            if state.owner != current {
                tracing::debug!(previous = ?state.owner, current = ?current, "identity changed, clearing list");
                state.todos.clear();
                state.error = None;
                state.owner = None;
            }
        }
        self.load().await;
    }

    async fn fetch(&self, kind: LoadKind) {
        let remote = match self.session.client() {
            Ok(remote) => remote,
            Err(_) => {
                let mut state = self.state.write();
                self.in_flight.lock().publish(&mut state);
                return;
            }
        };

        let guard = FetchGuard::start(self, kind);
        let result = remote.select_owned().await;
        self.settle_fetch(&remote, result);
        drop(guard);
    }

    fn settle_fetch(&self, remote: &RemoteTodos, result: Result<Vec<Todo>, StoreError>) {
        let mut state = self.state.write();
        if !self.is_current(remote) {
            tracing::debug!(user = %remote.owner().id, "discarding rows fetched for a previous session");
            return;
        }
        match result {
            Ok(rows) => {
                let owner = remote.owner().id.clone();
                state.todos = owned_newest_first(rows, &owner);
                state.owner = Some(owner);
                tracing::debug!(count = state.todos.len(), "todos loaded");
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load todos");
                state.error = Some(err.to_string());
            }
        }
    }

    /// Insert a new, incomplete todo and reload.
    ///
    /// Blank text is ignored without contacting the store.
    pub async fn add(&self, text: &str) -> Result<(), SyncError> {
        let remote = self.session.client()?;
        if text.trim().is_empty() {
            tracing::debug!("ignoring blank todo");
            return Ok(());
        }

        if let Err(err) = remote.insert(text).await {
            tracing::warn!(error = %err, "failed to add todo");
            return Err(SyncError::remote(err));
        }
        self.load().await;
        Ok(())
    }

    /// Flip `completed` for `id`, showing the new value immediately.
    ///
    /// `current_completed` is the value the caller rendered; the store is
    /// told to set its negation.
    pub async fn toggle(&self, id: &str, current_completed: bool) -> Result<(), SyncError> {
        let remote = self.session.client()?;
        let completed = !current_completed;
        self.apply(&Mutation::SetCompleted {
            id: id.to_string(),
            completed,
        });

        match remote.set_completed(id, completed).await {
            Ok(rows) => {
                let owner = &remote.owner().id;
                match rows.into_iter().find(|row| row.id == id && row.user_id == *owner) {
                    Some(row) if self.is_current(&remote) => self.apply(&Mutation::Replace(row)),
                    Some(_) => {}
                    None => {
                        tracing::debug!(id, "update matched no rows, reloading");
                        self.load().await;
                    }
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(id, error = %err, "failed to toggle todo, reloading");
                self.load().await;
                Err(SyncError::remote(err))
            }
        }
    }

    /// Start deleting `id`. Nothing happens until the returned request is
    /// confirmed.
    pub fn delete(&self, id: impl Into<String>) -> PendingDelete {
        PendingDelete {
            sync: self.clone(),
            id: id.into(),
        }
    }

    async fn delete_confirmed(&self, id: &str) -> Result<(), SyncError> {
        let remote = self.session.client()?;
        self.apply(&Mutation::Remove { id: id.to_string() });

        match remote.delete(id).await {
            Ok(rows) => {
                if rows.is_empty() {
                    tracing::debug!(id, "delete matched no rows, reloading");
                    self.load().await;
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(id, error = %err, "failed to delete todo, reloading");
                self.load().await;
                Err(SyncError::remote(err))
            }
        }
    }

    fn apply(&self, mutation: &Mutation) {
        let mut state = self.state.write();
        let todos = std::mem::take(&mut state.todos);
        state.todos = mutation.apply(todos);
    }

    fn is_current(&self, remote: &RemoteTodos) -> bool {
        remote.generation() == self.session.generation()
    }
}

/// The user's answer to "delete this todo?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Confirm,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The user declined; neither the list nor the store was touched.
    Cancelled,
}

/// A delete waiting for the user's decision.
#[must_use = "a delete does nothing until it is confirmed or cancelled"]
pub struct PendingDelete {
    sync: TodoSynchronizer,
    id: String,
}

impl PendingDelete {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn resolve(self, decision: Decision) -> Result<DeleteOutcome, SyncError> {
        match decision {
            Decision::Confirm => {
                self.sync.delete_confirmed(&self.id).await?;
                Ok(DeleteOutcome::Deleted)
            }
            Decision::Cancel => Ok(self.cancel()),
        }
    }

    pub async fn confirm(self) -> Result<DeleteOutcome, SyncError> {
        self.resolve(Decision::Confirm).await
    }

    pub fn cancel(self) -> DeleteOutcome {
        tracing::debug!(id = %self.id, "delete cancelled");
        DeleteOutcome::Cancelled
    }
}
