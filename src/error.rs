//! Error handler for taskline.
//!
//! Every failure leaves the server as `{ "error": .., "jwtToken": .. }`.
//! An invalid credential is answered with `200 OK` so that older clients
//! can read the message and drop their session.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::crypto::CryptoError;
use crate::middleware::Session;
use crate::token::TokenError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("error parsing request body")]
    ParsingForm(Box<dyn std::error::Error + Send + Sync>),

    #[error("{0}")]
    BadRequest(String),

    #[error("The JWT is no longer valid")]
    InvalidToken,

    #[error("Unable to determine user from token")]
    Unidentified,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Sql(#[from] sqlx::Error),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// Failure raised once the caller is identified. The refreshed
    /// credential still goes back to the client.
    #[error("{source}")]
    Scoped {
        token: String,
        source: Box<ServerError>,
    },
}

/// Attach the caller's refreshed credential to an error.
pub trait Scoped<T> {
    fn scoped(self, session: &Session) -> Result<T>;
}

impl<T, E: Into<ServerError>> Scoped<T> for std::result::Result<T, E> {
    fn scoped(self, session: &Session) -> Result<T> {
        self.map_err(|err| ServerError::Scoped {
            token: session.token.clone(),
            source: Box::new(err.into()),
        })
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
    jwt_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Update `error` field.
    pub fn details(mut self, description: &str) -> Self {
        self.error = description.into();
        self
    }

    /// Return a credential alongside the error.
    pub fn token(mut self, token: &str) -> Self {
        self.jwt_token = token.into();
        self
    }

    /// Automatically add errors field. The `error` field lists every
    /// distinct message once.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        let fields = parse_validation_errors(errors);
        let mut messages: Vec<&str> = Vec::new();
        for field in &fields {
            if !messages.contains(&field.message.as_str()) {
                messages.push(&field.message);
            }
        }

        self.error = messages.join("; ");
        self.errors = Some(fields);
        self
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "Internal server error.".to_owned(),
            jwt_token: String::default(),
            errors: None,
        }
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        match serde_json::to_string(&self) {
            Ok(body) => (
                self.status,
                [(header::CONTENT_TYPE, "application/json")],
                body,
            )
                .into_response(),
            Err(_) => internal_server_error(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect();
    // `field_errors` is a hash map.
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

impl ServerError {
    fn response(&self) -> ResponseError {
        let response = ResponseError::default()
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        match self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::Axum(rejection) => response.details(&rejection.body_text()),

            ServerError::InvalidToken => response.status(StatusCode::OK),

            ServerError::Unidentified => response.status(StatusCode::UNAUTHORIZED),

            ServerError::Forbidden(_) => response.status(StatusCode::FORBIDDEN),

            ServerError::Sql(_)
            | ServerError::Token(_)
            | ServerError::Crypto(_)
            | ServerError::Url(_) => {
                tracing::error!(error = %self, "server returned 500 status");
                response.status(StatusCode::INTERNAL_SERVER_ERROR)
            },

            ServerError::Scoped { token, source } => source.response().token(token),

            ServerError::ParsingForm(_) | ServerError::BadRequest(_) => response,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.response().into_response()
    }
}

fn internal_server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "error": "Internal server error.",
            "jwtToken": "",
        })
        .to_string(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use validator::ValidationError;

    async fn body(err: ServerError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_token_is_soft() {
        let (status, body) = body(ServerError::InvalidToken).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "The JWT is no longer valid");
        assert_eq!(body["jwtToken"], "");
    }

    #[tokio::test]
    async fn test_validation_messages_are_merged() {
        let mut errors = ValidationErrors::new();
        for field in ["userId", "title"] {
            errors.add(
                field,
                ValidationError::new("required")
                    .with_message("userId and title are required".into()),
            );
        }

        let (status, body) = body(errors.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "userId and title are required");
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scoped_keeps_status_and_token() {
        let session = Session {
            user_id: 1,
            token: "fresh".into(),
        };
        let err: Result<()> =
            Err(ServerError::Forbidden("Not authorized to edit this todo".into()));

        let (status, body) = body(err.scoped(&session).unwrap_err()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Not authorized to edit this todo");
        assert_eq!(body["jwtToken"], "fresh");
    }
}
