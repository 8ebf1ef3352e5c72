use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::Result;
use crate::mail::{Message, Template, deliver};
use crate::router::Valid;
use crate::router::login::Response;
use crate::user::{NewUser, OneTimeSecret};

const REQUIRED: &str = "firstName, lastName, login, password, and email are required";

pub const VERIFY_LINK_PATH: &str = "/api/verify-email-link";

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "all_present"))]
pub struct Body {
    first_name: Option<String>,
    last_name: Option<String>,
    login: Option<String>,
    password: Option<String>,
    email: Option<String>,
}

fn all_present(body: &Body) -> std::result::Result<(), ValidationError> {
    let filled = |field: &Option<String>| {
        field.as_deref().is_some_and(|value| !value.trim().is_empty())
    };

    if [&body.first_name, &body.last_name, &body.login, &body.email]
        .into_iter()
        .all(filled)
        && body.password.as_deref().is_some_and(|p| !p.is_empty())
    {
        Ok(())
    } else {
        Err(ValidationError::new("required").with_message(REQUIRED.into()))
    }
}

/// Handler to create user.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let login = body.login.unwrap_or_default().trim().to_owned();
    let email = body.email.unwrap_or_default().trim().to_owned();

    if state.db.users.find_by_login(&login).await?.is_some() {
        return Ok(Json(Response::refused(
            "An account with that login already exists",
        )));
    }
    if state.db.users.find_by_email(&email).await?.is_some() {
        return Ok(Json(Response::refused(
            "An account with that email already exists",
        )));
    }

    let now = state.clock.now();
    let verification = OneTimeSecret::generate(now);
    let user = state
        .db
        .users
        .create(NewUser {
            first_name: body.first_name.unwrap_or_default().trim().to_owned(),
            last_name: body.last_name.unwrap_or_default().trim().to_owned(),
            login,
            password: state
                .crypto
                .clone()
                .hash(body.password.unwrap_or_default())
                .await?,
            email,
            verification: verification.clone(),
            created_at: now,
        })
        .await?;

    tracing::info!(user_id = user.id, "user registered");

    let link = crate::router::magic_link(
        &state.config.url,
        VERIFY_LINK_PATH,
        &user.login,
        &verification.token,
    )?;
    deliver(
        state.mail.as_ref(),
        Message {
            to: user.email.clone(),
            template: Template::VerifyEmail,
            code: verification.code,
            link,
        },
    )
    .await;

    let jwt_token =
        state
            .token
            .issue(&user.first_name, &user.last_name, user.id)?;

    Ok(Json(Response {
        id: user.id,
        first_name: user.first_name,
        last_name: user.last_name,
        jwt_token,
        error: String::default(),
    }))
}
