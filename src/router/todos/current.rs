use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::AppState;
use crate::error::{Result, Scoped};
use crate::middleware::Session;
use crate::router::Valid;
use crate::todo::bucket::{self, Current, CurrentCounts};

const DEFAULT_DAYS: i64 = 7;

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default)]
    #[validate(custom(function = "super::list::user_id_required"))]
    user_id: Value,
    days: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub counts: CurrentCounts,
    #[serde(flatten)]
    pub buckets: Current,
    pub error: String,
    pub jwt_token: String,
}

/// Handler to sort open todos into overdue, today, upcoming and undated.
pub async fn handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    super::authorize(&session, Some(&body.user_id))?;
    let days = super::count(body.days.as_ref()).unwrap_or(DEFAULT_DAYS);

    let open = state
        .db
        .todos
        .list(session.user_id)
        .await
        .scoped(&session)?
        .into_iter()
        .filter(|todo| !todo.completed);
    let buckets = bucket::current(open, &super::local_now(&state), days);

    Ok(Json(Response {
        counts: buckets.counts(),
        buckets,
        error: String::default(),
        jwt_token: session.token,
    }))
}
