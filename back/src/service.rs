use api::v1::Todo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{error::Error, AppState};

/// A stored to-do entry. The owner never leaves the server; clients see the
/// wire [`Todo`] instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TodoRecord {
    pub id: Uuid,
    pub owner: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub done: Option<DateTime<Utc>>,
}

impl TodoRecord {
    fn to_wire(&self) -> Todo {
        Todo {
            id: self.id,
            content: self.content.clone(),
            created: self.created,
            done: self.done,
        }
    }
}

/// Item operations. Every operation takes the caller's subject and is
/// implicitly scoped to it; this is the only gateway to the item table.
impl AppState {
    /// Creates an entry owned by `owner`. Content is stored verbatim but
    /// must not be empty or whitespace-only.
    pub async fn add_todo(&self, owner: &str, content: &str) -> Result<Todo, Error> {
        if content.trim().is_empty() {
            return Err(Error::ValidationFailed("content must not be empty"));
        }

        let record = TodoRecord {
            id: Uuid::new_v4(),
            owner: owner.to_owned(),
            content: content.to_owned(),
            created: Utc::now(),
            done: None,
        };

        let todo = record.to_wire();
        self.todos.lock().await.insert(record.id, record);
        self.increment_generation();

        info!(id = %todo.id, "created todo");

        Ok(todo)
    }

    /// Sets or clears the done flag. Marking an already-done entry done again
    /// keeps the original timestamp; clearing reopens the entry. Absent and
    /// foreign-owned ids are both [`Error::NotFound`].
    pub async fn set_done(&self, owner: &str, id: Uuid, done: bool) -> Result<Todo, Error> {
        let mut todos = self.todos.lock().await;
        let record = todos
            .get_mut(&id)
            .filter(|record| record.owner == owner)
            .ok_or(Error::NotFound)?;

        match (done, record.done) {
            (true, None) => record.done = Some(Utc::now()),
            (true, Some(_)) => {}
            (false, _) => record.done = None,
        }

        let todo = record.to_wire();
        drop(todos);
        self.increment_generation();

        info!(id = %todo.id, done = todo.is_done(), "updated todo");

        Ok(todo)
    }

    /// Deletes the entry. Same `NotFound` semantics as [`AppState::set_done`].
    pub async fn remove_todo(&self, owner: &str, id: Uuid) -> Result<(), Error> {
        let mut todos = self.todos.lock().await;
        if todos.get(&id).map_or(true, |record| record.owner != owner) {
            return Err(Error::NotFound);
        }

        todos.remove(&id);
        drop(todos);
        self.increment_generation();

        info!(id = %id, "removed todo");

        Ok(())
    }

    /// All of `owner`'s entries, oldest first. Fresh query each call.
    pub async fn list_todos(&self, owner: &str) -> Vec<Todo> {
        let todos = self.todos.lock().await;
        let mut todos: Vec<_> = todos
            .values()
            .filter(|record| record.owner == owner)
            .map(TodoRecord::to_wire)
            .collect();

        todos.sort_unstable_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        todos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;

    #[tokio::test]
    async fn items_are_invisible_across_users() {
        let state = test_state();
        let todo = state.add_todo("user-a", "secret errand").await.unwrap();

        assert!(state.list_todos("user-b").await.is_empty());
        assert!(matches!(
            state.set_done("user-b", todo.id, true).await,
            Err(Error::NotFound)
        ));
        assert!(matches!(
            state.remove_todo("user-b", todo.id).await,
            Err(Error::NotFound)
        ));

        // The owner still sees an untouched entry.
        let todos = state.list_todos("user-a").await;
        assert_eq!(todos.len(), 1);
        assert!(!todos[0].is_done());
    }

    #[tokio::test]
    async fn foreign_and_missing_ids_are_indistinguishable() {
        let state = test_state();
        let todo = state.add_todo("user-a", "laundry").await.unwrap();

        let foreign = state.set_done("user-b", todo.id, true).await.unwrap_err();
        let missing = state
            .set_done("user-b", Uuid::new_v4(), true)
            .await
            .unwrap_err();

        assert_eq!(foreign.to_string(), missing.to_string());
    }

    #[tokio::test]
    async fn done_is_idempotent_and_reversible() {
        let state = test_state();
        let todo = state.add_todo("user-a", "call the bank").await.unwrap();

        let first = state.set_done("user-a", todo.id, true).await.unwrap();
        let marked_at = first.done.unwrap();

        // First completion wins.
        let second = state.set_done("user-a", todo.id, true).await.unwrap();
        assert_eq!(second.done, Some(marked_at));

        // Un-checking reopens the entry.
        let reopened = state.set_done("user-a", todo.id, false).await.unwrap();
        assert!(reopened.done.is_none());
    }

    #[tokio::test]
    async fn created_never_changes() {
        let state = test_state();
        let todo = state.add_todo("user-a", "water plants").await.unwrap();

        state.set_done("user-a", todo.id, true).await.unwrap();
        state.set_done("user-a", todo.id, false).await.unwrap();
        state.set_done("user-a", todo.id, true).await.unwrap();

        let todos = state.list_todos("user-a").await;
        assert_eq!(todos[0].created, todo.created);
    }

    #[tokio::test]
    async fn removed_items_stay_gone() {
        let state = test_state();
        let todo = state.add_todo("user-a", "return parcel").await.unwrap();

        state.remove_todo("user-a", todo.id).await.unwrap();

        assert!(state.list_todos("user-a").await.is_empty());
        assert!(matches!(
            state.set_done("user-a", todo.id, true).await,
            Err(Error::NotFound)
        ));
        assert!(matches!(
            state.remove_todo("user-a", todo.id).await,
            Err(Error::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_is_ordered_by_creation() {
        let state = test_state();
        let first = state.add_todo("user-a", "first").await.unwrap();
        let second = state.add_todo("user-a", "second").await.unwrap();
        let third = state.add_todo("user-a", "third").await.unwrap();

        // Completion must not affect ordering.
        state.set_done("user-a", first.id, true).await.unwrap();

        let ids: Vec<_> = state
            .list_todos("user-a")
            .await
            .into_iter()
            .map(|todo| todo.id)
            .collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[tokio::test]
    async fn content_round_trips_verbatim() {
        let state = test_state();
        let source = "# Groceries\n\n- [ ] **milk**\n- [ ] bread <script>\n";
        state.add_todo("user-a", source).await.unwrap();

        let todos = state.list_todos("user-a").await;
        assert_eq!(todos[0].content, source);
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let state = test_state();

        assert!(matches!(
            state.add_todo("user-a", "").await,
            Err(Error::ValidationFailed(_))
        ));
        assert!(matches!(
            state.add_todo("user-a", "   \n\t").await,
            Err(Error::ValidationFailed(_))
        ));
        assert!(state.list_todos("user-a").await.is_empty());
    }
}
