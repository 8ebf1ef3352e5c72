use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::error::{Result, Scoped};
use crate::middleware::Session;
use crate::{AppState, ServerError};

#[derive(Debug, Default, Deserialize)]
pub struct Body {
    #[serde(default, deserialize_with = "crate::router::lenient_string")]
    id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub deleted_count: u64,
    pub error: String,
    pub jwt_token: String,
}

/// Handler to delete one of the caller's todos.
pub async fn handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<Body>,
) -> Result<Json<Response>> {
    let id = super::todo_id(body.id.as_deref())?;

    let deleted_count = state
        .db
        .todos
        .delete(session.user_id, &id)
        .await
        .scoped(&session)?;
    if deleted_count == 0 {
        return Err(ServerError::Forbidden(
            "Not authorized to delete this todo".into(),
        ))
        .scoped(&session);
    }

    tracing::debug!(user_id = session.user_id, todo = %id, "todo deleted");
    Ok(Json(Response {
        deleted_count,
        error: String::default(),
        jwt_token: session.token,
    }))
}
