use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::Valid;
use crate::user::UserId;

const INVALID_CREDENTIALS: &str = "Invalid user name/password";
const UNVERIFIED: &str = "Please verify your email before logging in.";

#[derive(Debug, Default, Deserialize, Validate)]
pub struct Body {
    #[serde(default)]
    login: String,
    #[serde(default)]
    password: String,
}

/// Also returned by registration.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub jwt_token: String,
    pub error: String,
}

impl Response {
    /// Business failure, answered with `200 OK`.
    pub fn refused(error: &str) -> Self {
        Self {
            id: -1,
            first_name: String::default(),
            last_name: String::default(),
            jwt_token: String::default(),
            error: error.to_owned(),
        }
    }
}

/// Handler for user login.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    let user = state.db.users.find_by_login(&body.login).await?;
    let verified = match &user {
        Some(user) => {
            state
                .crypto
                .clone()
                .verify(body.password.clone(), user.password.clone())
                .await?
        },
        None => false,
    };
    let Some(user) = user.filter(|_| verified) else {
        metrics::counter!("auth_failures_total", "reason" => "password")
            .increment(1);
        return Ok(Json(Response::refused(INVALID_CREDENTIALS)));
    };

    if !user.email_verified {
        metrics::counter!("auth_failures_total", "reason" => "unverified")
            .increment(1);
        return Ok(Json(Response::refused(UNVERIFIED)));
    }

    let jwt_token =
        state
            .token
            .issue(&user.first_name, &user.last_name, user.id)?;

    tracing::debug!(user_id = user.id, "user logged in");

    Ok(Json(Response {
        id: user.id,
        first_name: user.first_name,
        last_name: user.last_name,
        jwt_token,
        error: String::default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::tests::{PASSWORD, state};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_login_handler() {
        let harness = state();
        let (id, _) = harness.user("ada").await;

        let (status, body) = harness
            .post("/api/login", json!({ "login": "ada", "password": PASSWORD }))
            .await;
        assert_eq!(status, StatusCode::OK);

        let body: Response = serde_json::from_value(body).unwrap();
        assert_eq!(body.id, id);
        assert_eq!(body.first_name, "Ada");
        assert_eq!(body.error, "");

        let claims = harness.state.token.decode(&body.jwt_token).unwrap();
        assert_eq!(claims.id, Some(id));
        assert_eq!(claims.last_name, "Lovelace");
    }

    #[tokio::test]
    async fn test_login_with_wrong_password() {
        let harness = state();
        harness.user("ada").await;

        for body in [
            json!({ "login": "ada", "password": "nope" }),
            json!({ "login": "grace", "password": PASSWORD }),
            json!({}),
        ] {
            let (status, body) = harness.post("/api/login", body).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["id"], -1);
            assert_eq!(body["error"], INVALID_CREDENTIALS);
            assert_eq!(body["jwtToken"], "");
        }
    }

    #[tokio::test]
    async fn test_login_unverified() {
        let harness = state();
        harness.unverified("ada").await;

        let (status, body) = harness
            .post("/api/login", json!({ "login": "ada", "password": PASSWORD }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], -1);
        assert_eq!(body["error"], UNVERIFIED);
    }
}
