//! Optimistic to-do list synchronization against a remote table.
//!
//! # Overview
//! A `SessionProvider` tracks who is signed in and hands out `RemoteTodos`
//! handles whose every request carries a freshly fetched credential. A
//! `TodoSynchronizer` owns the local list for that identity and keeps it in
//! step with the store: toggles and deletes show up locally before the store
//! answers, and any failed mutation is repaired by reloading from the store.
//!
//! # Design
//! - `TodoClient` is stateless and does no I/O: each table operation is a
//!   `build_*` (produces `HttpRequest`) and a `parse_*` (consumes
//!   `HttpResponse`), so the wire format is tested without a network.
//! - A `Transport` performs the round-trip; `UreqTransport` is bundled, hosts
//!   can plug in their own.
//! - Local edits are pure `Mutation`s over the list; there is no inverse
//!   mutation, only a reload.
//! - Wire types are defined independently from the mock-server crate;
//!   integration tests catch schema drift.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod state;
pub mod sync;
pub mod transport;
pub mod types;

#[cfg(test)]
mod test_support;

pub use client::TodoClient;
pub use config::StoreConfig;
pub use error::{ConfigError, SessionError, StoreError, SyncError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::{Identity, RemoteTodos, SessionProvider, StaticToken, TokenSource};
pub use state::{Mutation, TodoState};
pub use sync::{Decision, DeleteOutcome, PendingDelete, TodoSynchronizer};
pub use transport::{Transport, UreqTransport};
pub use types::{NewTodo, Todo, TodoPatch};
