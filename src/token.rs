//! Manage json web tokens.
//!
//! Credentials are HS256 tokens carrying `{ id, firstName, lastName }`.
//! Every authenticated call answers with a freshly signed copy.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::user::{UserId, parse_user_id};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signing secret is not configured")]
    MissingSecret,
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Owner identifier. Older tokens carry it as a string.
    #[serde(
        default,
        alias = "userId",
        alias = "UserID",
        deserialize_with = "lenient_id"
    )]
    pub id: Option<UserId>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Identifies the time at which the JWT was issued.
    #[serde(default)]
    pub iat: u64,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_user_id))
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    keys: Option<(EncodingKey, DecodingKey)>,
    /// Lifetime in seconds.
    expiration: Option<u64>,
}

impl TokenManager {
    /// Create a new [`TokenManager`].
    ///
    /// Without a secret the manager still answers, but every issue fails and
    /// every token is invalid.
    pub fn new(secret: Option<&str>, expiration: Option<u64>) -> Self {
        let keys = secret.filter(|s| !s.is_empty()).map(|secret| {
            (
                EncodingKey::from_secret(secret.as_bytes()),
                DecodingKey::from_secret(secret.as_bytes()),
            )
        });

        if keys.is_none() {
            tracing::warn!("no token secret configured, authentication is disabled");
        }

        Self { keys, expiration }
    }

    fn sign(&self, mut claims: Claims) -> Result<String, TokenError> {
        let Some((key, _)) = &self.keys else {
            return Err(TokenError::MissingSecret);
        };

        let now = get_current_timestamp();
        claims.iat = now;
        claims.exp = self.expiration.map(|ttl| now + ttl);

        Ok(encode(&Header::new(Algorithm::HS256), &claims, key)?)
    }

    /// Sign a new credential for a user.
    pub fn issue(
        &self,
        first_name: &str,
        last_name: &str,
        id: UserId,
    ) -> Result<String, TokenError> {
        self.sign(Claims {
            id: Some(id),
            first_name: first_name.to_owned(),
            last_name: last_name.to_owned(),
            ..Default::default()
        })
    }

    /// Verify signature (and expiry, when present) then return the payload.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let Some((_, key)) = &self.keys else {
            return Err(TokenError::MissingSecret);
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();

        Ok(decode::<Claims>(token, key, &validation)?.claims)
    }

    pub fn is_valid(&self, token: &str) -> bool {
        self.decode(token).is_ok()
    }

    /// Re-sign a verified credential with the same identity.
    ///
    /// Forged or unsigned payloads are rejected rather than laundered into
    /// a valid token.
    pub fn refresh(&self, token: &str) -> Result<(Claims, String), TokenError> {
        let claims = self.decode(token)?;
        let fresh = self.sign(claims.clone())?;
        Ok((claims, fresh))
    }
}
