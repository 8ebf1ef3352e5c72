//! Todo persistence port. Every call is scoped to one owner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::todo::{Todo, TodoId, TodoPatch};
use crate::user::UserId;

/// Documents matched and actually changed by an update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

#[async_trait]
pub trait TodoRepository: Send + Sync {
    async fn insert(&self, todo: &Todo) -> Result<()>;

    async fn find(&self, owner: UserId, id: &TodoId) -> Result<Option<Todo>>;

    /// Every todo of `owner`, newest first.
    async fn list(&self, owner: UserId) -> Result<Vec<Todo>>;

    /// Completed todos of `owner` in [`crate::todo::bucket::completion_order`],
    /// at most `limit` of them.
    async fn list_completed(&self, owner: UserId, limit: usize) -> Result<Vec<Todo>>;

    /// Apply a partial update to one todo.
    async fn update(
        &self,
        owner: UserId,
        id: &TodoId,
        patch: &TodoPatch,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome>;

    /// Set the completion flag on several todos at once.
    async fn set_completed(
        &self,
        owner: UserId,
        ids: &[TodoId],
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome>;

    /// Returns the number of deleted todos, zero or one.
    async fn delete(&self, owner: UserId, id: &TodoId) -> Result<u64>;
}
