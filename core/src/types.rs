//! Wire types for the remote todo table.
//!
//! # Design
//! Field names match the table's column names so rows deserialize straight
//! from the store's JSON. These types are defined independently of the
//! mock-server crate; integration tests catch schema drift between the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single row of the todo table.
///
/// `id` and `created_at` are assigned by the store on insert and never
/// change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub user_id: String,
}

/// Insert payload. The store fills in `id` and `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTodo {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub user_id: String,
}

/// Update payload. Only the fields present in the JSON are applied; omitted
/// fields remain unchanged on the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TodoPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
        }
    }
}
