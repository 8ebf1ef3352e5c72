use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::error::{Result, Scoped};
use crate::middleware::Session;
use crate::router::{Valid, present};
use crate::todo::Todo;

/// Body shared by the read endpoints.
#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    #[serde(default)]
    #[validate(custom(function = "user_id_required"))]
    pub user_id: Value,
}

pub(super) fn user_id_required(value: &Value) -> std::result::Result<(), ValidationError> {
    present(value).map_err(|err| err.with_message("userId is required".into()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub results: Vec<Todo>,
    pub error: String,
    pub jwt_token: String,
}

/// Handler to list every todo of the caller, newest first.
pub async fn handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Valid(body): Valid<Owner>,
) -> Result<Json<Response>> {
    super::authorize(&session, Some(&body.user_id))?;

    let results = state.db.todos.list(session.user_id).await.scoped(&session)?;
    Ok(Json(Response {
        results,
        error: String::default(),
        jwt_token: session.token,
    }))
}

#[cfg(test)]
mod tests {
    use crate::router::tests::state;
    use crate::router::todos::tests::seed;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_todos() {
        let harness = state();
        let (ada, token) = harness.user("ada").await;
        let (grace, _) = harness.user("grace").await;
        let first = seed(&harness, ada, "First").await;
        harness.clock.advance(chrono::TimeDelta::minutes(5));
        seed(&harness, grace, "Not mine").await;

        let (status, body) = harness
            .post("/api/gettodos", json!({ "userId": ada, "jwtToken": token }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "");

        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        let todo = &results[0];
        assert_eq!(todo["id"], first.id.as_str());
        assert_eq!(todo["title"], "First");
        assert_eq!(todo["completed"], false);
        assert_eq!(todo["priority"], "Low");
        assert_eq!(todo["dueDate"], serde_json::Value::Null);
        assert_eq!(todo["createdAt"], "2025-06-15T13:00:00Z");
        assert!(todo.get("owner").is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let harness = state();
        let (ada, token) = harness.user("ada").await;
        let mut older = seed(&harness, ada, "Older").await;
        older.created_at -= chrono::TimeDelta::days(1);
        harness.state.db.todos.delete(ada, &older.id).await.unwrap();
        harness.state.db.todos.insert(&older).await.unwrap();
        seed(&harness, ada, "Newer").await;

        let (_, body) = harness
            .post("/api/gettodos", json!({ "userId": ada.to_string(), "jwtToken": token }))
            .await;
        let titles: Vec<_> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["title"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(titles, ["Newer", "Older"]);
    }

    #[tokio::test]
    async fn test_list_rejections() {
        let harness = state();
        let (_, token) = harness.user("ada").await;
        let (grace, _) = harness.user("grace").await;

        let (status, body) = harness
            .post("/api/gettodos", json!({ "jwtToken": token }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "userId is required");

        let (status, body) = harness
            .post("/api/gettodos", json!({ "userId": grace, "jwtToken": token }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Not authorized for this user");
    }
}
