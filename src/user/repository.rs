//! Account persistence port.

use async_trait::async_trait;

use crate::error::Result;
use crate::user::{NewUser, User};

/// Port for account persistence operations.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find an account by its exact login.
    async fn find_by_login(&self, login: &str) -> Result<Option<User>>;

    /// Find an account by email, ignoring case.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Store a new account under the next sequential identifier.
    async fn create(&self, user: NewUser) -> Result<User>;

    /// Persist every mutable field of an existing account.
    async fn update(&self, user: &User) -> Result<()>;
}
