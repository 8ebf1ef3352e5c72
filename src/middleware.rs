//! Middlewares for routes.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use serde::Deserialize;

use crate::AppState;
use crate::ServerError;
use crate::error::Result;
use crate::user::UserId;

const BODY_LIMIT: usize = 30_000;
const BEARER: &str = "bearer ";

/// Caller identity, inserted as a request extension by [`authenticate`].
#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: UserId,
    /// Freshly signed credential to send back.
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credentials {
    jwt_token: Option<String>,
    access_token: Option<String>,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let prefix = value.get(..BEARER.len())?;

    prefix
        .eq_ignore_ascii_case(BEARER)
        .then(|| value[BEARER.len()..].trim().to_owned())
        .filter(|token| !token.is_empty())
}

fn reject(reason: &'static str, err: ServerError) -> ServerError {
    metrics::counter!("auth_failures_total", "reason" => reason).increment(1);
    tracing::debug!(reason, "request rejected by credential guard");
    err
}

/// Credential guard.
///
/// The token is read from `jwtToken` or `accessToken` in the JSON body, or
/// from an `Authorization: Bearer` header. The body is buffered and handed
/// back untouched to the handler.
pub async fn authenticate(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let (mut parts, body) = req.into_parts();
    let body_bytes = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(|err| ServerError::ParsingForm(Box::new(err)))?;
    let credentials =
        serde_json::from_slice::<Credentials>(&body_bytes).unwrap_or_default();

    let token = credentials
        .jwt_token
        .filter(|t| !t.is_empty())
        .or(credentials.access_token.filter(|t| !t.is_empty()))
        .or_else(|| bearer(&parts.headers));
    let Some(token) = token else {
        return Err(reject("missing", ServerError::InvalidToken));
    };

    let (claims, refreshed) = state
        .token
        .refresh(&token)
        .map_err(|_| reject("invalid", ServerError::InvalidToken))?;
    let Some(user_id) = claims.id else {
        return Err(reject("unidentified", ServerError::Unidentified));
    };

    parts.extensions.insert(Session {
        user_id,
        token: refreshed,
    });

    let req = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer(&headers), Some("abc.def".into()));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer   xyz "));
        assert_eq!(bearer(&headers), Some("xyz".into()));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        assert_eq!(bearer(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer(&headers), None);
    }
}
