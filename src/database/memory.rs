//! In-memory adapters, for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::todo::bucket::completion_order;
use crate::todo::{Todo, TodoId, TodoPatch, TodoRepository, UpdateOutcome};
use crate::user::{NewUser, User, UserId, UserRepository};

#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<Vec<User>>,
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.login == login).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let mut users = self.users.write().await;
        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;

        let user = User {
            id,
            first_name: user.first_name,
            last_name: user.last_name,
            login: user.login,
            password: user.password,
            email: user.email,
            email_verified: false,
            verification: Some(user.verification),
            reset: None,
            created_at: user.created_at,
            updated_at: user.created_at,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if let Some(stored) = users.iter_mut().find(|u| u.id == user.id) {
            *stored = user.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTodoRepository {
    todos: RwLock<Vec<Todo>>,
}

impl MemoryTodoRepository {
    async fn modify(
        &self,
        owner: UserId,
        ids: &[TodoId],
        change: impl Fn(&mut Todo) -> bool + Send,
    ) -> UpdateOutcome {
        let mut todos = self.todos.write().await;
        let mut outcome = UpdateOutcome::default();

        for todo in todos
            .iter_mut()
            .filter(|t| t.owner == owner && ids.contains(&t.id))
        {
            outcome.matched += 1;
            if change(todo) {
                outcome.modified += 1;
            }
        }
        outcome
    }
}

#[async_trait]
impl TodoRepository for MemoryTodoRepository {
    async fn insert(&self, todo: &Todo) -> Result<()> {
        self.todos.write().await.push(todo.clone());
        Ok(())
    }

    async fn find(&self, owner: UserId, id: &TodoId) -> Result<Option<Todo>> {
        let todos = self.todos.read().await;
        Ok(todos
            .iter()
            .find(|t| t.owner == owner && &t.id == id)
            .cloned())
    }

    async fn list(&self, owner: UserId) -> Result<Vec<Todo>> {
        let mut todos: Vec<Todo> = self
            .todos
            .read()
            .await
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        todos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(todos)
    }

    async fn list_completed(&self, owner: UserId, limit: usize) -> Result<Vec<Todo>> {
        let mut todos: Vec<Todo> = self
            .todos
            .read()
            .await
            .iter()
            .filter(|t| t.owner == owner && t.completed)
            .cloned()
            .collect();
        todos.sort_by(completion_order);
        todos.truncate(limit);
        Ok(todos)
    }

    async fn update(
        &self,
        owner: UserId,
        id: &TodoId,
        patch: &TodoPatch,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        Ok(self
            .modify(owner, std::slice::from_ref(id), |todo| patch.apply(todo, now))
            .await)
    }

    async fn set_completed(
        &self,
        owner: UserId,
        ids: &[TodoId],
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        let patch = TodoPatch {
            completed: Some(completed),
            ..Default::default()
        };
        Ok(self.modify(owner, ids, |todo| patch.apply(todo, now)).await)
    }

    async fn delete(&self, owner: UserId, id: &TodoId) -> Result<u64> {
        let mut todos = self.todos.write().await;
        let before = todos.len();
        todos.retain(|t| !(t.owner == owner && &t.id == id));
        Ok((before - todos.len()) as u64)
    }
}
