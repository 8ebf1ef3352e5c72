//! database (db) union structure.
mod memory;
mod postgres;

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::postgres::PgPoolOptions;

use crate::AppState;
use crate::todo::TodoRepository;
use crate::user::UserRepository;

pub use memory::{MemoryTodoRepository, MemoryUserRepository};
pub use postgres::{PgTodoRepository, PgUserRepository};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "taskline";
pub const DEFAULT_POOL_SIZE: u32 = 10;

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub users: Arc<dyn UserRepository>,
    pub todos: Arc<dyn TodoRepository>,
}

impl Database {
    /// Init database connections and apply pending migrations.
    pub async fn postgres(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
    ) -> Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new().max_connections(pool);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        sqlx::migrate!()
            .run(&postgres)
            .await
            .map_err(|err| sqlx::Error::Migrate(Box::new(err)))?;

        Ok(Self {
            users: Arc::new(PgUserRepository::new(postgres.clone())),
            todos: Arc::new(PgTodoRepository::new(postgres)),
        })
    }

    /// Volatile storage, lost on restart.
    pub fn memory() -> Self {
        Self {
            users: Arc::new(MemoryUserRepository::default()),
            todos: Arc::new(MemoryTodoRepository::default()),
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(app_state: &AppState) -> Database {
        app_state.db.clone()
    }
}
