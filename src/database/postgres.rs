//! PostgreSQL adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::error::Result;
use crate::todo::{Todo, TodoId, TodoPatch, TodoRepository, UpdateOutcome};
use crate::user::{NewUser, OneTimeSecret, User, UserId, UserRepository};

const TODO_COLUMNS: &str = "id, owner, title, description, completed, created_at, start_date, due_date, completed_at, priority";

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    first_name: String,
    last_name: String,
    login: String,
    password: String,
    email: String,
    email_verified: bool,
    verification_code: Option<String>,
    verification_token: Option<String>,
    verification_expires: Option<DateTime<Utc>>,
    verification_attempts: i32,
    reset_code: Option<String>,
    reset_token: Option<String>,
    reset_expires: Option<DateTime<Utc>>,
    reset_attempts: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn secret(
    code: Option<String>,
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    attempts: i32,
) -> Option<OneTimeSecret> {
    Some(OneTimeSecret {
        code: code?,
        token: token?,
        expires_at: expires_at?,
        attempts,
    })
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            login: row.login,
            password: row.password,
            email: row.email,
            email_verified: row.email_verified,
            verification: secret(
                row.verification_code,
                row.verification_token,
                row.verification_expires,
                row.verification_attempts,
            ),
            reset: secret(
                row.reset_code,
                row.reset_token,
                row.reset_expires,
                row.reset_attempts,
            ),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Accounts stored in the `users` table.
#[derive(Clone, Debug)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE login = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn create(&self, user: NewUser) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        // Serialize identifier allocation, readers are not blocked.
        sqlx::query("LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, UserRow>(
            r#"INSERT INTO users (
                id, first_name, last_name, login, password, email, email_verified,
                verification_code, verification_token, verification_expires,
                created_at, updated_at
            )
            SELECT COALESCE(MAX(id), 0) + 1, $1, $2, $3, $4, $5, FALSE, $6, $7, $8, $9, $9
            FROM users
            RETURNING *"#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.login)
        .bind(&user.password)
        .bind(&user.email)
        .bind(&user.verification.code)
        .bind(&user.verification.token)
        .bind(user.verification.expires_at)
        .bind(user.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(user_id = row.id, "user created");
        Ok(row.into())
    }

    async fn update(&self, user: &User) -> Result<()> {
        let verification = user.verification.as_ref();
        let reset = user.reset.as_ref();

        sqlx::query(
            r#"UPDATE users SET
                first_name = $2, last_name = $3, password = $4, email = $5,
                email_verified = $6,
                verification_code = $7, verification_token = $8, verification_expires = $9,
                verification_attempts = $10,
                reset_code = $11, reset_token = $12, reset_expires = $13,
                reset_attempts = $14,
                updated_at = $15
            WHERE id = $1"#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.password)
        .bind(&user.email)
        .bind(user.email_verified)
        .bind(verification.map(|s| s.code.as_str()))
        .bind(verification.map(|s| s.token.as_str()))
        .bind(verification.map(|s| s.expires_at))
        .bind(verification.map_or(0, |s| s.attempts))
        .bind(reset.map(|s| s.code.as_str()))
        .bind(reset.map(|s| s.token.as_str()))
        .bind(reset.map(|s| s.expires_at))
        .bind(reset.map_or(0, |s| s.attempts))
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Todos stored in the `todos` table.
#[derive(Clone, Debug)]
pub struct PgTodoRepository {
    pool: PgPool,
}

impl PgTodoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write back every mutable column of `todo`.
    async fn save(tx: &mut Transaction<'_, Postgres>, todo: &Todo) -> Result<()> {
        sqlx::query(
            r#"UPDATE todos SET
                title = $3, description = $4, completed = $5, start_date = $6,
                due_date = $7, completed_at = $8, priority = $9
            WHERE owner = $1 AND id = $2"#,
        )
        .bind(todo.owner)
        .bind(&todo.id)
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.completed)
        .bind(todo.start_date)
        .bind(todo.due_date)
        .bind(todo.completed_at)
        .bind(todo.priority)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Lock matching rows, let `change` edit them, save what changed.
    async fn modify(
        &self,
        owner: UserId,
        ids: Vec<String>,
        change: impl Fn(&mut Todo) -> bool + Send,
    ) -> Result<UpdateOutcome> {
        let mut tx = self.pool.begin().await?;

        let todos = sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE owner = $1 AND id = ANY($2) FOR UPDATE"
        ))
        .bind(owner)
        .bind(ids)
        .fetch_all(&mut *tx)
        .await?;

        let mut outcome = UpdateOutcome {
            matched: todos.len() as u64,
            modified: 0,
        };
        for mut todo in todos {
            if change(&mut todo) {
                Self::save(&mut tx, &todo).await?;
                outcome.modified += 1;
            }
        }

        tx.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl TodoRepository for PgTodoRepository {
    async fn insert(&self, todo: &Todo) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO todos ({TODO_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(&todo.id)
        .bind(todo.owner)
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.completed)
        .bind(todo.created_at)
        .bind(todo.start_date)
        .bind(todo.due_date)
        .bind(todo.completed_at)
        .bind(todo.priority)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, owner: UserId, id: &TodoId) -> Result<Option<Todo>> {
        Ok(sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE owner = $1 AND id = $2"
        ))
        .bind(owner)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list(&self, owner: UserId) -> Result<Vec<Todo>> {
        Ok(sqlx::query_as::<_, Todo>(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE owner = $1 ORDER BY created_at DESC"
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_completed(&self, owner: UserId, limit: usize) -> Result<Vec<Todo>> {
        Ok(sqlx::query_as::<_, Todo>(&format!(
            r#"SELECT {TODO_COLUMNS} FROM todos
            WHERE owner = $1 AND completed
            ORDER BY completed_at DESC NULLS LAST, due_date DESC NULLS LAST, created_at DESC
            LIMIT $2"#
        ))
        .bind(owner)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn update(
        &self,
        owner: UserId,
        id: &TodoId,
        patch: &TodoPatch,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        self.modify(owner, vec![id.to_string()], |todo| patch.apply(todo, now))
            .await
    }

    async fn set_completed(
        &self,
        owner: UserId,
        ids: &[TodoId],
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        let ids = ids.iter().map(ToString::to_string).collect();
        let patch = TodoPatch {
            completed: Some(completed),
            ..Default::default()
        };
        self.modify(owner, ids, |todo| patch.apply(todo, now)).await
    }

    async fn delete(&self, owner: UserId, id: &TodoId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM todos WHERE owner = $1 AND id = $2")
            .bind(owner)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
