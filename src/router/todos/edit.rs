use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::date::parse_date;
use crate::error::{Result, Scoped};
use crate::middleware::Session;
use crate::todo::{Priority, TodoPatch};
use crate::{AppState, ServerError};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default, deserialize_with = "crate::router::lenient_string")]
    id: Option<String>,
    title: Option<Value>,
    description: Option<Value>,
    completed: Option<Value>,
    #[serde(default, deserialize_with = "crate::router::double_option")]
    start_date: Option<Option<Value>>,
    #[serde(default, deserialize_with = "crate::router::double_option")]
    due_date: Option<Option<Value>>,
    priority: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub modified_count: u64,
    pub error: String,
    pub jwt_token: String,
}

/// `null` clears the date, anything else must parse.
fn date_change(
    field: &str,
    value: Option<Option<Value>>,
    tz: &Tz,
) -> Result<Option<Option<DateTime<Utc>>>> {
    match value {
        None => Ok(None),
        Some(None) => Ok(Some(None)),
        Some(Some(raw)) => parse_date(&raw, tz)
            .map(|date| Some(Some(date)))
            .ok_or_else(|| ServerError::BadRequest(format!("{field} is invalid"))),
    }
}

/// Only well-typed fields are taken into account. A blank title is ignored.
fn patch(body: Body, tz: &Tz) -> Result<TodoPatch> {
    Ok(TodoPatch {
        title: body
            .title
            .as_ref()
            .and_then(Value::as_str)
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty()),
        description: body
            .description
            .as_ref()
            .and_then(Value::as_str)
            .map(|d| d.trim().to_owned()),
        completed: body.completed.as_ref().and_then(Value::as_bool),
        start_date: date_change("startDate", body.start_date, tz)?,
        due_date: date_change("dueDate", body.due_date, tz)?,
        priority: body
            .priority
            .map(|p| Priority::normalize(p.as_str().unwrap_or_default())),
    })
}

/// Handler to partially update one of the caller's todos.
pub async fn handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(body): Json<Body>,
) -> Result<Json<Response>> {
    let id = super::todo_id(body.id.as_deref())?;
    let patch = patch(body, &state.config.tz())?;
    if patch.is_empty() {
        return Err(ServerError::BadRequest("no fields to update".into()));
    }

    let outcome = state
        .db
        .todos
        .update(session.user_id, &id, &patch, state.clock.now())
        .await
        .scoped(&session)?;
    if outcome.matched == 0 {
        return Err(ServerError::Forbidden(
            "Not authorized to edit this todo".into(),
        ))
        .scoped(&session);
    }

    Ok(Json(Response {
        modified_count: outcome.modified,
        error: String::default(),
        jwt_token: session.token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::tests::{now, state};
    use crate::router::todos::tests::{fetch, seed};
    use axum::http::StatusCode;
    use chrono::TimeZone;
    use serde_json::json;

    #[tokio::test]
    async fn test_edit_todo() {
        let harness = state();
        let (id, token) = harness.user("ada").await;
        let todo = seed(&harness, id, "Buy milk").await;

        let (status, body) = harness
            .post(
                "/api/edittodo",
                json!({
                    "id": todo.id,
                    "title": " Buy oat milk ",
                    "priority": "medium",
                    "completed": true,
                    "jwtToken": token,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["modifiedCount"], 1);
        assert_eq!(body["error"], "");

        let stored = fetch(&harness, id, &todo).await;
        assert_eq!(stored.title, "Buy oat milk");
        assert_eq!(stored.priority, Priority::Medium);
        assert!(stored.completed);
        assert_eq!(stored.completed_at, Some(now()));

        let (status, body) = harness
            .post(
                "/api/edittodo",
                json!({ "id": todo.id, "completed": false, "jwtToken": token }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["modifiedCount"], 1);
        assert_eq!(fetch(&harness, id, &todo).await.completed_at, None);
    }

    #[tokio::test]
    async fn test_edit_due_date_round_trip() {
        let harness = state();
        let (id, token) = harness.user("ada").await;
        let todo = seed(&harness, id, "Taxes").await;
        harness
            .state
            .db
            .todos
            .update(
                id,
                &todo.id,
                &TodoPatch {
                    due_date: Some(Some(now())),
                    ..Default::default()
                },
                now(),
            )
            .await
            .unwrap();

        let clear = json!({ "id": todo.id, "dueDate": null, "jwtToken": token });
        let (_, body) = harness.post("/api/edittodo", clear.clone()).await;
        assert_eq!(body["modifiedCount"], 1);
        assert_eq!(fetch(&harness, id, &todo).await.due_date, None);

        let (status, body) = harness.post("/api/edittodo", clear).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["modifiedCount"], 0);

        let set = json!({
            "id": todo.id,
            "dueDate": "2025-07-01T12:00:00.000Z",
            "jwtToken": token,
        });
        let (_, body) = harness.post("/api/edittodo", set.clone()).await;
        assert_eq!(body["modifiedCount"], 1);
        let (_, body) = harness.post("/api/edittodo", set).await;
        assert_eq!(body["modifiedCount"], 0);
        assert_eq!(
            fetch(&harness, id, &todo).await.due_date,
            Some(Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn test_edit_rejections() {
        let harness = state();
        let (ada, token) = harness.user("ada").await;
        let (_, grace_token) = harness.user("grace").await;
        let todo = seed(&harness, ada, "Buy milk").await;

        let (status, body) = harness
            .post("/api/edittodo", json!({ "id": todo.id, "jwtToken": token }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "no fields to update");

        let (status, body) = harness
            .post(
                "/api/edittodo",
                json!({ "id": todo.id, "dueDate": "soon", "jwtToken": token }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "dueDate is invalid");

        let (status, body) = harness
            .post(
                "/api/edittodo",
                json!({ "id": todo.id, "startDate": "", "jwtToken": token }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "startDate is invalid");

        let (status, body) = harness
            .post(
                "/api/edittodo",
                json!({ "id": todo.id, "title": "Mine now", "jwtToken": grace_token }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Not authorized to edit this todo");
        assert!(!body["jwtToken"].as_str().unwrap().is_empty());
        assert_eq!(fetch(&harness, ada, &todo).await.title, "Buy milk");
    }

    #[tokio::test]
    async fn test_edit_blank_title_is_ignored() {
        let harness = state();
        let (ada, token) = harness.user("ada").await;
        let todo = seed(&harness, ada, "Buy milk").await;

        let (status, body) = harness
            .post(
                "/api/edittodo",
                json!({ "id": todo.id, "title": "   ", "jwtToken": token }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "no fields to update");

        let (status, body) = harness
            .post(
                "/api/edittodo",
                json!({ "id": todo.id, "title": "", "description": "semi-skimmed", "jwtToken": token }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["modifiedCount"], 1);

        let stored = fetch(&harness, ada, &todo).await;
        assert_eq!(stored.title, "Buy milk");
        assert_eq!(stored.description, "semi-skimmed");
    }
}
