//! Accounts and their one-time secrets.
mod repository;

pub use repository::*;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::crypto;

/// Canonical owner identifier, assigned sequentially at registration.
pub type UserId = i64;

/// How long a verification or reset secret stays usable.
pub const SECRET_VALIDITY: TimeDelta = TimeDelta::minutes(15);

/// Wrong guesses a secret survives before it must be requested again.
pub const MAX_ATTEMPTS: i32 = 5;

/// Read an identifier sent either as a JSON number or a numeric string.
pub fn parse_user_id(value: &Value) -> Option<UserId> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as UserId)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// User as saved on database.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub login: String,
    /// Argon2id PHC string.
    pub password: String,
    pub email: String,
    pub email_verified: bool,
    pub verification: Option<OneTimeSecret>,
    pub reset: Option<OneTimeSecret>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration data, before an identifier is assigned.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub login: String,
    pub password: String,
    pub email: String,
    pub verification: OneTimeSecret,
    pub created_at: DateTime<Utc>,
}

/// Code and link token sent by email, valid for [`SECRET_VALIDITY`] and
/// [`MAX_ATTEMPTS`] wrong guesses.
#[derive(Clone, Debug, PartialEq)]
pub struct OneTimeSecret {
    pub code: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// Failed checks so far. Must be saved back after a refusal.
    pub attempts: i32,
}

/// Why a one-time secret was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SecretError {
    #[error("expired")]
    Expired,
    #[error("invalid")]
    Invalid,
    #[error("too many attempts")]
    TooManyAttempts,
}

impl OneTimeSecret {
    /// Draw a fresh code and token expiring [`SECRET_VALIDITY`] after `now`.
    pub fn generate(now: DateTime<Utc>) -> Self {
        Self {
            code: crypto::one_time_code(),
            token: crypto::one_time_token(),
            expires_at: now + SECRET_VALIDITY,
            attempts: 0,
        }
    }

    fn check(&mut self, now: DateTime<Utc>, token: bool, given: &str) -> Result<(), SecretError> {
        if now > self.expires_at {
            return Err(SecretError::Expired);
        }
        if self.attempts >= MAX_ATTEMPTS {
            return Err(SecretError::TooManyAttempts);
        }

        let expected = if token { &self.token } else { &self.code };
        if bool::from(expected.as_bytes().ct_eq(given.trim().as_bytes())) {
            Ok(())
        } else {
            self.attempts += 1;
            Err(SecretError::Invalid)
        }
    }

    pub fn check_code(&mut self, now: DateTime<Utc>, code: &str) -> Result<(), SecretError> {
        self.check(now, false, code)
    }

    pub fn check_token(&mut self, now: DateTime<Utc>, token: &str) -> Result<(), SecretError> {
        self.check(now, true, token)
    }
}
