//! Forgotten password flow.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::Result;
use crate::mail::{Message, Template, deliver};
use crate::router::verify::{Lookup, Sent, TOO_MANY_ATTEMPTS};
use crate::router::{Valid, find_user, magic_link};
use crate::user::{OneTimeSecret, SecretError, User};

pub const RESET_LINK_PATH: &str = "/reset-password";

fn given(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn required(message: &'static str) -> ValidationError {
    ValidationError::new("required").with_message(message.into())
}

/// The reset form sends the address typed by the user as `login`.
async fn account(state: &AppState, login: &str) -> Result<Option<User>> {
    match find_user(state, Some(login), None).await? {
        Some(user) => Ok(Some(user)),
        None if login.contains('@') => find_user(state, None, Some(login)).await,
        None => Ok(None),
    }
}

/// Handler to send a reset code and link.
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
    user.reset = Some(secret.clone());
    user.updated_at = now;
    state.db.users.update(&user).await?;

    let link = magic_link(
        &state.config.frontend_url,
        RESET_LINK_PATH,
        &user.login,
        &secret.token,
    )?;
    deliver(
        state.mail.as_ref(),
        Message {
            to: user.email,
            template: Template::ResetPassword,
            code: secret.code.clone(),
            link: link.clone(),
        },
    )
    .await;

    tracing::info!(user_id = user.id, "password reset requested");
    Ok(Json(Sent::delivered(state.config.debug_email, secret.code, link)))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "code_and_account"))]
pub struct VerifyCodeBody {
    login: Option<String>,
    email: Option<String>,
    #[serde(default, deserialize_with = "crate::router::lenient_string")]
    code: Option<String>,
}

fn code_and_account(body: &VerifyCodeBody) -> std::result::Result<(), ValidationError> {
    if (given(&body.login) || given(&body.email)) && given(&body.code) {
        Ok(())
    } else {
        Err(required("login or email, and code are required"))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeVerified {
    pub verified: bool,
    pub reset_token: String,
    pub error: String,
}

impl CodeVerified {
    fn refused(error: &str) -> Self {
        Self {
            error: error.to_owned(),
            ..Default::default()
        }
    }
}

/// Handler to check a reset code and swap it for the reset token.
///
/// The secret is kept: the token is spent by
/// [`with_token_handler`].
pub async fn verify_code_handler(
    State(state): State<AppState>,
    Valid(body): Valid<VerifyCodeBody>,
) -> Result<Json<CodeVerified>> {
    let user = find_user(&state, body.login.as_deref(), body.email.as_deref()).await?;
    let Some(mut user) = user else {
        return Ok(Json(CodeVerified::refused("user not found")));
    };
    let Some(secret) = user.reset.as_mut() else {
        return Ok(Json(CodeVerified::refused("no reset requested")));
    };

    match secret.check_code(state.clock.now(), body.code.as_deref().unwrap_or_default()) {
        Ok(()) => Ok(Json(CodeVerified {
            verified: true,
            reset_token: secret.token.clone(),
            error: String::default(),
        })),
        Err(SecretError::Expired) => Ok(Json(CodeVerified::refused("code expired"))),
        Err(SecretError::Invalid) => {
            state.db.users.update(&user).await?;
            Ok(Json(CodeVerified::refused("invalid code")))
        },
        Err(SecretError::TooManyAttempts) => Ok(Json(CodeVerified::refused(TOO_MANY_ATTEMPTS))),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Outcome {
    pub error: String,
}

impl Outcome {
    fn refused(error: &str) -> Json<Self> {
        Json(Self {
            error: error.to_owned(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "with_code_fields"))]
pub struct WithCodeBody {
    login: Option<String>,
    #[serde(default, deserialize_with = "crate::router::lenient_string")]
    code: Option<String>,
    new_password: Option<String>,
}

fn with_code_fields(body: &WithCodeBody) -> std::result::Result<(), ValidationError> {
    if given(&body.login) && given(&body.code) && given(&body.new_password) {
        Ok(())
    } else {
        Err(required("login, code, newPassword required"))
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "with_token_fields"))]
pub struct WithTokenBody {
    login: Option<String>,
    token: Option<String>,
    new_password: Option<String>,
}

fn with_token_fields(body: &WithTokenBody) -> std::result::Result<(), ValidationError> {
    if given(&body.login) && given(&body.token) && given(&body.new_password) {
        Ok(())
    } else {
        Err(required("login, token, newPassword required"))
    }
}

/// Which half of the reset secret the client proves.
enum Proof {
    Code(String),
    Token(String),
}

async fn reset_password(
    state: &AppState,
    login: &str,
    proof: Proof,
    new_password: &str,
) -> Result<Json<Outcome>> {
    let Some(mut user) = account(state, login).await? else {
        return Ok(Outcome::refused("user not found"));
    };
    let Some(secret) = user.reset.as_mut() else {
        return Ok(Outcome::refused("no reset requested"));
    };

    let now = state.clock.now();
    let checked = match &proof {
        Proof::Code(code) => secret.check_code(now, code),
        Proof::Token(token) => secret.check_token(now, token),
    };
    if checked == Err(SecretError::Invalid) {
        state.db.users.update(&user).await?;
    }
    match (checked, proof) {
        (Ok(()), _) => {},
        (Err(SecretError::TooManyAttempts), _) => return Ok(Outcome::refused(TOO_MANY_ATTEMPTS)),
        (Err(SecretError::Expired), Proof::Code(_)) => return Ok(Outcome::refused("code expired")),
        (Err(SecretError::Invalid), Proof::Code(_)) => return Ok(Outcome::refused("invalid code")),
        (Err(SecretError::Expired), Proof::Token(_)) => return Ok(Outcome::refused("token expired")),
        (Err(SecretError::Invalid), Proof::Token(_)) => return Ok(Outcome::refused("invalid token")),
    }

    user.password = state.crypto.clone().hash(new_password.to_owned()).await?;
    user.reset = None;
    user.updated_at = now;
    state.db.users.update(&user).await?;

    tracing::info!(user_id = user.id, "password changed");
    Ok(Json(Outcome::default()))
}

/// Handler to change a password with the six digit code.
pub async fn with_code_handler(
    State(state): State<AppState>,
    Valid(body): Valid<WithCodeBody>,
) -> Result<Json<Outcome>> {
    reset_password(
        &state,
        body.login.as_deref().unwrap_or_default(),
        Proof::Code(body.code.unwrap_or_default()),
        body.new_password.as_deref().unwrap_or_default(),
    )
    .await
}

/// Handler to change a password from the emailed link.
pub async fn with_token_handler(
    State(state): State<AppState>,
    Valid(body): Valid<WithTokenBody>,
) -> Result<Json<Outcome>> {
    reset_password(
        &state,
        body.login.as_deref().unwrap_or_default(),
        Proof::Token(body.token.unwrap_or_default()),
        body.new_password.as_deref().unwrap_or_default(),
    )
    .await
}
