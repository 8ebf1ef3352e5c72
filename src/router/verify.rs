//! Email ownership checks, by typed code or by magic link.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::Result;
use crate::mail::{Message, Template, deliver};
use crate::router::register::VERIFY_LINK_PATH;
use crate::router::{Valid, find_user, magic_link};
use crate::user::{OneTimeSecret, SecretError};

/// Answer once a secret has been guessed wrong too often.
pub const TOO_MANY_ATTEMPTS: &str = "too many attempts, request a new code";

/// Account designated by login or by email.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "login_or_email"))]
pub struct Lookup {
    pub login: Option<String>,
    pub email: Option<String>,
}

fn login_or_email(body: &Lookup) -> std::result::Result<(), ValidationError> {
    let given = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());

    if given(&body.login) || given(&body.email) {
        Ok(())
    } else {
        Err(ValidationError::new("required").with_message("login or email is required".into()))
    }
}

/// Outcome of a code or link request.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Sent {
    pub sent: bool,
    /// Only echoed in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub error: String,
}

impl Sent {
    pub fn refused(error: &str) -> Self {
        Self {
            error: error.to_owned(),
            ..Default::default()
        }
    }

    pub fn delivered(debug: bool, code: String, link: String) -> Self {
        Self {
            sent: true,
            code: debug.then_some(code),
            link: debug.then_some(link),
            error: String::default(),
        }
    }
}

/// Handler to issue a new verification code and link.
pub async fn request_handler(
    State(state): State<AppState>,
    Valid(body): Valid<Lookup>,
) -> Result<Json<Sent>> {
    let user = find_user(&state, body.login.as_deref(), body.email.as_deref()).await?;
    let Some(mut user) = user else {
        return Ok(Json(Sent::refused("user not found")));
    };
    if user.email.trim().is_empty() {
        return Ok(Json(Sent::refused("user has no email")));
    }

    let now = state.clock.now();
    let secret = OneTimeSecret::generate(now);
    user.email_verified = false;
    user.verification = Some(secret.clone());
    user.updated_at = now;
    state.db.users.update(&user).await?;

    let link = magic_link(&state.config.url, VERIFY_LINK_PATH, &user.login, &secret.token)?;
    deliver(
        state.mail.as_ref(),
        Message {
            to: user.email,
            template: Template::VerifyEmail,
            code: secret.code.clone(),
            link: link.clone(),
        },
    )
    .await;

    Ok(Json(Sent::delivered(state.config.debug_email, secret.code, link)))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "login_and_code"))]
pub struct CodeBody {
    login: Option<String>,
    #[serde(default, deserialize_with = "crate::router::lenient_string")]
    code: Option<String>,
}

fn login_and_code(body: &CodeBody) -> std::result::Result<(), ValidationError> {
    let given = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());

    if given(&body.login) && given(&body.code) {
        Ok(())
    } else {
        Err(ValidationError::new("required").with_message("login and code are required".into()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Verified {
    pub verified: bool,
    pub error: String,
}

impl Verified {
    fn refused(error: &str) -> Self {
        Self {
            verified: false,
            error: error.to_owned(),
        }
    }

    fn ok() -> Self {
        Self {
            verified: true,
            error: String::default(),
        }
    }
}

/// Handler to confirm an email with the six digit code.
pub async fn code_handler(
    State(state): State<AppState>,
    Valid(body): Valid<CodeBody>,
) -> Result<Json<Verified>> {
    let login = body.login.unwrap_or_default();
    let Some(mut user) = state.db.users.find_by_login(login.trim()).await? else {
        return Ok(Json(Verified::refused("user not found")));
    };
    if user.email_verified {
        return Ok(Json(Verified::ok()));
    }
    let Some(secret) = user.verification.as_mut() else {
        return Ok(Json(Verified::refused("no code requested")));
    };

    let now = state.clock.now();
    match secret.check_code(now, &body.code.unwrap_or_default()) {
        Ok(()) => {},
        Err(SecretError::Expired) => return Ok(Json(Verified::refused("code expired"))),
        Err(SecretError::Invalid) => {
            state.db.users.update(&user).await?;
            return Ok(Json(Verified::refused("invalid code")));
        },
        Err(SecretError::TooManyAttempts) => return Ok(Json(Verified::refused(TOO_MANY_ATTEMPTS))),
    }

    user.email_verified = true;
    user.verification = None;
    user.updated_at = now;
    state.db.users.update(&user).await?;

    tracing::info!(user_id = user.id, "email verified");
    Ok(Json(Verified::ok()))
}

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    login: Option<String>,
    token: Option<String>,
}

/// Handler behind the link sent by email. Answers plain text for browsers.
pub async fn link_handler(
    State(state): State<AppState>,
    Query(query): Query<LinkQuery>,
) -> Result<Response> {
    let (Some(login), Some(token)) = (
        query.login.filter(|l| !l.is_empty()),
        query.token.filter(|t| !t.is_empty()),
    ) else {
        return Ok((StatusCode::BAD_REQUEST, "Missing login or token").into_response());
    };

    let Some(mut user) = state.db.users.find_by_login(&login).await? else {
        return Ok((StatusCode::NOT_FOUND, "User not found").into_response());
    };
    let Some(secret) = user.verification.as_mut() else {
        return Ok((StatusCode::BAD_REQUEST, "No token issued").into_response());
    };

    let now = state.clock.now();
    match secret.check_token(now, &token) {
        Ok(()) => {},
        Err(SecretError::Expired) => {
            return Ok((StatusCode::BAD_REQUEST, "Token expired").into_response());
        },
        Err(SecretError::Invalid) => {
            state.db.users.update(&user).await?;
            return Ok((StatusCode::BAD_REQUEST, "Invalid token").into_response());
        },
        Err(SecretError::TooManyAttempts) => {
            return Ok((StatusCode::TOO_MANY_REQUESTS, "Too many attempts").into_response());
        },
    }

    user.email_verified = true;
    user.verification = None;
    user.updated_at = now;
    state.db.users.update(&user).await?;

    tracing::info!(user_id = user.id, "email verified by link");
    Ok(Redirect::to(&format!("{}/?verified=1", state.config.frontend_url)).into_response())
}
