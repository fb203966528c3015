use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A to-do entry as seen by clients. `content` is the raw Markdown source
/// exactly as it was submitted; rendering happens in the browser. The owner
/// is implicit in the session and never serialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub content: String,
    pub created: DateTime<Utc>,
    /// When the entry was first marked done, `None` while open.
    pub done: Option<DateTime<Utc>>,
}

impl Todo {
    pub fn is_done(&self) -> bool {
        self.done.is_some()
    }
}

/// Body of `POST /api/v1/todos`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateTodo {
    pub content: String,
}
