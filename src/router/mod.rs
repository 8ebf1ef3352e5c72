//! HTTP API.
pub mod login;
pub mod register;
pub mod reset;
pub mod status;
pub mod todos;
pub mod verify;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use url::Url;
use validator::{Validate, ValidationError};

use crate::user::User;
use crate::{AppState, ServerError};

/// `/api` routes.
pub fn api(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/login", post(login::handler))
        .route("/register", post(register::handler))
        .route(
            "/request-email-verification",
            post(verify::request_handler),
        )
        .route("/verify-email", post(verify::code_handler))
        .route("/verify-email-link", get(verify::link_handler))
        .route("/request-password-reset", post(reset::request_handler))
        .route("/verify-reset-code", post(reset::verify_code_handler))
        .route("/reset-password-with-code", post(reset::with_code_handler))
        .route("/reset-password-with-token", post(reset::with_token_handler))
        .merge(todos::router(state))
}

/// JSON body checked with [`validator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Reject strings made of whitespace only.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

/// Reject values a browser client would treat as missing.
pub fn present(value: &Value) -> Result<(), ValidationError> {
    let missing = match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.trim().is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    };

    if missing {
        Err(ValidationError::new("required"))
    } else {
        Ok(())
    }
}

/// Keep the difference between an absent field and an explicit `null`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Codes are typed as numbers by some clients.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Find an account by login, or by email when no login is given.
pub async fn find_user(
    state: &AppState,
    login: Option<&str>,
    email: Option<&str>,
) -> crate::error::Result<Option<User>> {
    let login = login.map(str::trim).filter(|l| !l.is_empty());
    let email = email.map(str::trim).filter(|e| !e.is_empty());

    match (login, email) {
        (Some(login), _) => state.db.users.find_by_login(login).await,
        (None, Some(email)) => state.db.users.find_by_email(email).await,
        (None, None) => Ok(None),
    }
}

/// `base` + `path` with `login` and `token` as query parameters.
pub fn magic_link(
    base: &str,
    path: &str,
    login: &str,
    token: &str,
) -> Result<String, url::ParseError> {
    let url = Url::parse_with_params(
        &format!("{base}{path}"),
        &[("login", login), ("token", token)],
    )?;
    Ok(url.into())
}
