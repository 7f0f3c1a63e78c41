//! Current identity and the credential-bound remote client.
//!
//! # Design
//! The session never stores a token. It stores a `TokenSource` callback and
//! asks it for a fresh token on every request, so token rotation needs no
//! coordination. `SessionProvider::client` builds a new `RemoteTodos` handle
//! from the current session each time it is called; handles are cheap
//! (`Arc` clones) and tagged with the session generation they were built for.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::client::TodoClient;
use crate::config::StoreConfig;
use crate::error::{SessionError, StoreError};
use crate::transport::Transport;
use crate::types::{NewTodo, Todo, TodoPatch};

/// The signed-in user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub id: String,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Per-request credential callback.
///
/// `Ok(None)` means "no user token right now"; the request then goes out with
/// the anon key as bearer and the store treats it as anonymous.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<Option<String>, String>;
}

/// A fixed token. Useful for tools and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<Option<String>, String> {
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
struct Session {
    identity: Identity,
    tokens: Arc<dyn TokenSource>,
}

/// Holds the current session and hands out bound clients.
pub struct SessionProvider {
    client: TodoClient,
    transport: Arc<dyn Transport>,
    current: RwLock<Option<Session>>,
    generation: AtomicU64,
}

impl SessionProvider {
    pub fn new(config: &StoreConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            client: TodoClient::new(config),
            transport,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn sign_in(&self, identity: Identity, tokens: Arc<dyn TokenSource>) {
        tracing::debug!(user = %identity.id, "session signed in");
        let mut current = self.current.write();
        *current = Some(Session { identity, tokens });
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn sign_out(&self) {
        let mut current = self.current.write();
        if current.take().is_some() {
            tracing::debug!("session signed out");
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.current.read().as_ref().map(|s| s.identity.clone())
    }

    /// Bumped on every sign-in and sign-out.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// A remote handle bound to the current identity and token source.
    ///
    /// The generation is read under the same lock as the session, so a
    /// handle never pairs one identity with another identity's generation.
    pub fn client(&self) -> Result<RemoteTodos, SessionError> {
        let current = self.current.read();
        let session = current.as_ref().ok_or(SessionError::Unavailable)?;
        Ok(RemoteTodos {
            client: self.client.clone(),
            transport: Arc::clone(&self.transport),
            tokens: Arc::clone(&session.tokens),
            owner: session.identity.clone(),
            generation: self.generation(),
        })
    }
}

/// Table operations scoped to one owner.
#[derive(Clone)]
pub struct RemoteTodos {
    client: TodoClient,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenSource>,
    owner: Identity,
    generation: u64,
}

impl RemoteTodos {
    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    async fn bearer(&self) -> Result<Option<String>, StoreError> {
        self.tokens.token().await.map_err(StoreError::CredentialUnavailable)
    }

    /// All rows owned by this handle's identity, newest first.
    pub async fn select_owned(&self) -> Result<Vec<Todo>, StoreError> {
        let bearer = self.bearer().await?;
        let req = self.client.build_select_owned(&self.owner.id, bearer.as_deref());
        let resp = self.transport.execute(req).await?;
        self.client.parse_select(resp)
    }

    pub async fn insert(&self, text: &str) -> Result<(), StoreError> {
        let input = NewTodo {
            text: text.to_string(),
            completed: false,
            user_id: self.owner.id.clone(),
        };
        let bearer = self.bearer().await?;
        let req = self.client.build_insert(&input, bearer.as_deref())?;
        let resp = self.transport.execute(req).await?;
        self.client.parse_insert(resp)
    }

    /// Returns the rows the store reports as updated.
    pub async fn set_completed(&self, id: &str, completed: bool) -> Result<Vec<Todo>, StoreError> {
        let bearer = self.bearer().await?;
        let req = self.client.build_update(
            id,
            &self.owner.id,
            &TodoPatch::completed(completed),
            bearer.as_deref(),
        )?;
        let resp = self.transport.execute(req).await?;
        self.client.parse_update(resp)
    }

    /// Returns the rows the store reports as deleted.
    pub async fn delete(&self, id: &str) -> Result<Vec<Todo>, StoreError> {
        let bearer = self.bearer().await?;
        let req = self.client.build_delete(id, &self.owner.id, bearer.as_deref());
        let resp = self.transport.execute(req).await?;
        self.client.parse_delete(resp)
    }
}
