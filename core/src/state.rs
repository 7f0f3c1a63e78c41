//! Local list state and the pure transitions applied to it.
//!
//! Optimistic edits are expressed as `Mutation` values applied by
//! `Mutation::apply`. None of them is ever inverted: a failed remote call is
//! repaired by a fresh load, not by undoing the mutation.

use crate::types::Todo;

/// Everything a view needs to render the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoState {
    pub todos: Vec<Todo>,
    /// True until the first load settles, and while a load is in flight.
    pub is_loading: bool,
    /// True while a pull-to-refresh load is in flight.
    pub is_refreshing: bool,
    /// Message from the most recent failed load.
    pub error: Option<String>,
    /// Owner of the rows in `todos`, if any were ever loaded.
    pub owner: Option<String>,
}

impl Default for TodoState {
    fn default() -> Self {
        Self {
            todos: Vec::new(),
            is_loading: true,
            is_refreshing: false,
            error: None,
            owner: None,
        }
    }
}

impl TodoState {
    pub fn get(&self, id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    pub fn remaining(&self) -> usize {
        self.todos.iter().filter(|t| !t.completed).count()
    }
}

/// An optimistic local edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetCompleted { id: String, completed: bool },
    Remove { id: String },
    /// Overwrite a row with the store's copy of it.
    Replace(Todo),
}

impl Mutation {
    /// Entries that don't match are left untouched, so applying a mutation
    /// for an unknown id is a no-op.
    pub fn apply(&self, todos: Vec<Todo>) -> Vec<Todo> {
        match self {
            Mutation::SetCompleted { id, completed } => todos
                .into_iter()
                .map(|mut t| {
                    if t.id == *id {
                        t.completed = *completed;
                    }
                    t
                })
                .collect(),
            Mutation::Remove { id } => todos.into_iter().filter(|t| t.id != *id).collect(),
            Mutation::Replace(row) => todos
                .into_iter()
                .map(|t| if t.id == row.id { row.clone() } else { t })
                .collect(),
        }
    }
}

/// Keep rows owned by `owner`, newest `created_at` first.
///
/// The sort is stable, so rows with equal timestamps keep the store's order.
pub fn owned_newest_first(rows: Vec<Todo>, owner: &str) -> Vec<Todo> {
    let mut todos: Vec<Todo> = rows.into_iter().filter(|t| t.user_id == owner).collect();
    todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    todos
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn todo(id: &str, secs: i64, owner: &str) -> Todo {
        Todo {
            id: id.to_string(),
            text: format!("todo {id}"),
            completed: false,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
            user_id: owner.to_string(),
        }
    }

    #[test]
    fn orders_newest_first() {
        let rows = vec![todo("t1", 1, "u"), todo("t3", 3, "u"), todo("t2", 2, "u")];
        let ids: Vec<_> = owned_newest_first(rows, "u").into_iter().map(|t| t.id).collect();
        assert_eq!(ids, ["t3", "t2", "t1"]);
    }

    #[test]
    fn equal_timestamps_keep_store_order() {
        let rows = vec![todo("a", 5, "u"), todo("b", 5, "u"), todo("c", 9, "u")];
        let ids: Vec<_> = owned_newest_first(rows, "u").into_iter().map(|t| t.id).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn drops_rows_of_other_owners() {
        let rows = vec![todo("mine", 1, "u"), todo("theirs", 2, "other")];
        let todos = owned_newest_first(rows, "u");
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].id, "mine");
    }

    #[test]
    fn set_completed_touches_only_matching_entry() {
        let todos = vec![todo("1", 1, "u"), todo("2", 2, "u")];
        let todos = Mutation::SetCompleted {
            id: "1".to_string(),
            completed: true,
        }
        .apply(todos);
        assert!(todos[0].completed);
        assert!(!todos[1].completed);
    }

    #[test]
    fn remove_and_unknown_ids() {
        let todos = vec![todo("1", 1, "u"), todo("2", 2, "u")];
        let todos = Mutation::Remove { id: "1".to_string() }.apply(todos);
        assert_eq!(todos.len(), 1);

        let unchanged = Mutation::Remove { id: "nope".to_string() }.apply(todos.clone());
        assert_eq!(unchanged, todos);
    }

    #[test]
    fn replace_swaps_in_store_copy() {
        let mut stored = todo("1", 1, "u");
        stored.completed = true;
        stored.text = "from store".to_string();
        let todos = Mutation::Replace(stored.clone()).apply(vec![todo("1", 1, "u")]);
        assert_eq!(todos, vec![stored]);
    }

    #[test]
    fn fresh_state_is_loading() {
        let state = TodoState::default();
        assert!(state.is_loading);
        assert!(state.todos.is_empty());
        assert_eq!(state.remaining(), 0);
    }
}
