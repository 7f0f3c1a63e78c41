//! Error types for the store client, session, and synchronizer.
//!
//! # Design
//! `Unauthorized` gets a dedicated variant because callers distinguish "the
//! store rejected our credentials" from "the store returned an unexpected
//! status." All other non-success responses land in `Http` with the status
//! code and the store's message.

use thiserror::Error;

/// Errors produced while talking to the remote table.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The token callback failed, so the request was never sent.
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),

    /// The store returned 401 or 403.
    #[error("unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The store returned another non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The round-trip itself failed (connect, TLS, read).
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Errors returned by `SessionProvider::client`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no signed-in user; remote client unavailable")]
    Unavailable,
}

/// Errors surfaced to callers of the synchronizer's mutating operations.
///
/// By the time a caller observes `RemoteFailure` from a toggle or delete, the
/// local list has already been reconciled against the store.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("{message}")]
    RemoteFailure {
        message: String,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    pub(crate) fn remote(source: StoreError) -> Self {
        SyncError::RemoteFailure {
            message: source.to_string(),
            source,
        }
    }
}

impl From<SessionError> for SyncError {
    fn from(_: SessionError) -> Self {
        SyncError::NotAuthenticated
    }
}

/// Errors produced while loading `StoreConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load store config: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid store config: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
