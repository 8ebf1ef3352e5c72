use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::date::{add_days, end_of_day};
use crate::error::{Result, Scoped};
use crate::middleware::Session;
use crate::todo::TodoPatch;
use crate::{AppState, ServerError};

#[derive(Debug, Default, Deserialize)]
pub struct Body {
    #[serde(default, deserialize_with = "crate::router::lenient_string")]
    id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub modified_count: u64,
    pub new_due_date: DateTime<Utc>,
    pub error: String,
    pub jwt_token: String,
}

/// Handler to push a due date one calendar day later.
///
/// An undated todo becomes due at the end of tomorrow.
pub async fn handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<Body>,
) -> Result<Json<Response>> {
    let id = super::todo_id(body.id.as_deref())?;

    let todo = state
        .db
        .todos
        .find(session.user_id, &id)
        .await
        .scoped(&session)?;
    let Some(todo) = todo else {
        return Err(ServerError::Forbidden(
            "Not authorized to modify this todo".into(),
        ))
        .scoped(&session);
    };

    let now = super::local_now(&state);
    let new_due_date = match todo.due_date {
        Some(due) => add_days(&due.with_timezone(&now.timezone()), 1),
        None => end_of_day(&add_days(&now, 1)),
    }
    .with_timezone(&Utc);

    let patch = TodoPatch {
        due_date: Some(Some(new_due_date)),
        ..Default::default()
    };
    let outcome = state
        .db
        .todos
        .update(session.user_id, &id, &patch, now.with_timezone(&Utc))
        .await
        .scoped(&session)?;

    Ok(Json(Response {
        modified_count: outcome.modified,
        new_due_date,
        error: String::default(),
        jwt_token: session.token,
    }))
}
