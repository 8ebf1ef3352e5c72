use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, Scoped};
use crate::middleware::Session;
use crate::todo::TodoId;
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
    pub new_status: bool,
    pub error: String,
    pub jwt_token: String,
}

/// Handler to flip the completion flag of one todo.
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

    let new_status = !todo.completed;
    let outcome = state
        .db
        .todos
        .set_completed(session.user_id, &[id], new_status, state.clock.now())
        .await
        .scoped(&session)?;

    Ok(Json(Response {
        modified_count: outcome.modified,
        new_status,
        error: String::default(),
        jwt_token: session.token,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct BulkBody {
    ids: Option<Value>,
    completed: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResponse {
    pub modified_count: u64,
    pub error: String,
    pub jwt_token: String,
}

/// Handler to set the completion flag of several todos.
///
/// Malformed identifiers are skipped. Todos of other users are left
/// untouched and simply not counted.
pub async fn bulk_handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<BulkBody>,
) -> Result<Json<BulkResponse>> {
    let (Some(Value::Array(ids)), Some(Value::Bool(completed))) = (body.ids, body.completed)
    else {
        return Err(ServerError::BadRequest(
            "ids[] and completed(boolean) required".into(),
        ));
    };

    let ids: Vec<TodoId> = ids
        .iter()
        .filter_map(Value::as_str)
        .filter_map(TodoId::parse)
        .collect();
    if ids.is_empty() {
        return Err(ServerError::BadRequest("no valid ids".into()));
    }

    let outcome = state
        .db
        .todos
        .set_completed(session.user_id, &ids, completed, state.clock.now())
        .await
        .scoped(&session)?;

    tracing::debug!(
        user_id = session.user_id,
        matched = outcome.matched,
        modified = outcome.modified,
        "bulk completion"
    );
    Ok(Json(BulkResponse {
        modified_count: outcome.modified,
        error: String::default(),
        jwt_token: session.token,
    }))
}

#[cfg(test)]
mod tests {
    use crate::router::tests::{now, state};
    use crate::router::todos::tests::{fetch, seed};
    use axum::http::StatusCode;
    use chrono::TimeDelta;
    use serde_json::json;

    #[tokio::test]
    async fn test_toggle() {
        let harness = state();
        let (id, token) = harness.user("ada").await;
        let todo = seed(&harness, id, "Buy milk").await;

        let (status, body) = harness
            .post("/api/check", json!({ "id": todo.id, "jwtToken": token }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["modifiedCount"], 1);
        assert_eq!(body["newStatus"], true);
        let stored = fetch(&harness, id, &todo).await;
        assert!(stored.completed);
        assert_eq!(stored.completed_at, Some(now()));

        harness.clock.advance(TimeDelta::minutes(1));
        let (_, body) = harness
            .post("/api/check", json!({ "id": todo.id, "jwtToken": token }))
            .await;
        assert_eq!(body["newStatus"], false);
        let stored = fetch(&harness, id, &todo).await;
        assert!(!stored.completed);
        assert_eq!(stored.completed_at, None);
    }

    #[tokio::test]
    async fn test_toggle_other_users_todo() {
        let harness = state();
        let (ada, _) = harness.user("ada").await;
        let (_, grace_token) = harness.user("grace").await;
        let todo = seed(&harness, ada, "Private").await;

        let (status, body) = harness
            .post("/api/check", json!({ "id": todo.id, "jwtToken": grace_token }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Not authorized to modify this todo");
        assert!(!fetch(&harness, ada, &todo).await.completed);
    }

    #[tokio::test]
    async fn test_bulk() {
        let harness = state();
        let (ada, token) = harness.user("ada").await;
        let (grace, _) = harness.user("grace").await;
        let first = seed(&harness, ada, "First").await;
        let second = seed(&harness, ada, "Second").await;
        let theirs = seed(&harness, grace, "Theirs").await;

        let (status, body) = harness
            .post(
                "/api/check-bulk",
                json!({
                    "ids": [first.id, second.id, theirs.id, "garbage", 12],
                    "completed": true,
                    "jwtToken": token,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["modifiedCount"], 2);

        for todo in [&first, &second] {
            let stored = fetch(&harness, ada, todo).await;
            assert!(stored.completed);
            assert_eq!(stored.completed_at, Some(now()));
        }
        assert!(!fetch(&harness, grace, &theirs).await.completed);

        // Idempotent.
        let (_, body) = harness
            .post(
                "/api/check-bulk",
                json!({ "ids": [first.id], "completed": true, "jwtToken": token }),
            )
            .await;
        assert_eq!(body["modifiedCount"], 0);

        let (_, body) = harness
            .post(
                "/api/check-bulk",
                json!({ "ids": [first.id, second.id], "completed": false, "jwtToken": token }),
            )
            .await;
        assert_eq!(body["modifiedCount"], 2);
        assert_eq!(fetch(&harness, ada, &first).await.completed_at, None);
    }

    #[tokio::test]
    async fn test_bulk_rejections() {
        let harness = state();
        let (_, token) = harness.user("ada").await;

        for body in [
            json!({ "ids": "abc", "completed": true, "jwtToken": token }),
            json!({ "ids": [], "completed": "yes", "jwtToken": token }),
            json!({ "completed": true, "jwtToken": token }),
        ] {
            let (status, body) = harness.post("/api/check-bulk", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "ids[] and completed(boolean) required");
        }

        let (status, body) = harness
            .post(
                "/api/check-bulk",
                json!({ "ids": ["nope"], "completed": true, "jwtToken": token }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "no valid ids");
    }
}
