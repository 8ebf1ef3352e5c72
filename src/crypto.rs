//! Cryptogragic logics.

use std::sync::Arc;

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

use crate::config::Argon2 as ArgonConfig;

/// Bytes of entropy behind a one-time link token.
const TOKEN_BYTES: usize = 24;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("password task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Check a password against a stored PHC string.
    ///
    /// A malformed stored hash never matches.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> bool {
        let Ok(parsed) = PasswordHash::new(phc_hash) else {
            tracing::warn!("stored password hash is not a PHC string");
            return false;
        };

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .is_ok()
    }

    /// [`PasswordManager::hash_password`] on the blocking pool.
    pub async fn hash(self: Arc<Self>, password: String) -> Result<String> {
        tokio::task::spawn_blocking(move || self.hash_password(password))
            .await?
    }

    /// [`PasswordManager::verify_password`] on the blocking pool.
    pub async fn verify(
        self: Arc<Self>,
        password: String,
        phc_hash: String,
    ) -> Result<bool> {
        Ok(tokio::task::spawn_blocking(move || {
            self.verify_password(password, &phc_hash)
        })
        .await?)
    }
}

/// Six digit code typed by hand from an email.
pub fn one_time_code() -> String {
    OsRng.gen_range(100_000..1_000_000).to_string()
}

/// Random token carried by magic links.
pub fn one_time_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
