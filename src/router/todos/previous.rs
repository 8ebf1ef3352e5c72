use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::AppState;
use crate::error::{Result, Scoped};
use crate::middleware::Session;
use crate::router::Valid;
use crate::todo::bucket::{self, Previous, PreviousCounts};

const DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default)]
    #[validate(custom(function = "super::list::user_id_required"))]
    user_id: Value,
    limit: Option<Value>,
    include_no_timestamp: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub counts: PreviousCounts,
    #[serde(flatten)]
    pub buckets: Previous,
    pub error: String,
    pub jwt_token: String,
}

/// Handler to sort completed todos by how long ago they were done.
pub async fn handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    super::authorize(&session, Some(&body.user_id))?;
    let limit = super::count(body.limit.as_ref())
        .and_then(|limit| usize::try_from(limit).ok())
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_LIMIT);

    let completed = state
        .db
        .todos
        .list_completed(session.user_id, limit)
        .await
        .scoped(&session)?;
    let buckets = bucket::previous(
        completed,
        &super::local_now(&state),
        super::flag(body.include_no_timestamp.as_ref()).unwrap_or(true),
    );

    Ok(Json(Response {
        counts: buckets.counts(),
        buckets,
        error: String::default(),
        jwt_token: session.token,
    }))
}

#[cfg(test)]
mod tests {
    use crate::router::tests::{Harness, now, state};
    use crate::router::todos::tests::seed;
    use crate::todo::{Priority, Todo, TodoId};
    use crate::user::UserId;
    use axum::http::StatusCode;
    use chrono::TimeDelta;
    use serde_json::json;

    async fn complete(harness: &Harness, owner: UserId, title: &str, ago: TimeDelta) {
        let todo = seed(harness, owner, title).await;
        harness
            .state
            .db
            .todos
            .set_completed(owner, &[todo.id], true, now() - ago)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_previous() {
        let harness = state();
        let (id, token) = harness.user("ada").await;
        complete(&harness, id, "today", TimeDelta::hours(2)).await;
        complete(&harness, id, "yesterday", TimeDelta::days(1)).await;
        complete(&harness, id, "last week", TimeDelta::days(4)).await;
        complete(&harness, id, "last month", TimeDelta::days(20)).await;
        complete(&harness, id, "ages ago", TimeDelta::days(90)).await;
        seed(&harness, id, "open").await;

        let (status, body) = harness
            .post("/api/previous", json!({ "userId": id, "jwtToken": token }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["today"][0]["title"], "today");
        assert_eq!(body["yesterday"][0]["title"], "yesterday");
        assert_eq!(body["last7"][0]["title"], "last week");
        assert_eq!(body["last30"][0]["title"], "last month");
        assert_eq!(body["older"][0]["title"], "ages ago");
        assert_eq!(body["noTimestamp"].as_array().unwrap().len(), 0);
        assert_eq!(body["counts"]["total"], 5);
    }

    #[tokio::test]
    async fn test_previous_limit() {
        let harness = state();
        let (id, token) = harness.user("ada").await;
        complete(&harness, id, "older", TimeDelta::days(3)).await;
        complete(&harness, id, "newer", TimeDelta::hours(1)).await;

        let (_, body) = harness
            .post(
                "/api/previous",
                json!({ "userId": id, "limit": 1, "jwtToken": token }),
            )
            .await;
        assert_eq!(body["counts"]["total"], 1);
        assert_eq!(body["today"][0]["title"], "newer");

        let (_, body) = harness
            .post(
                "/api/previous",
                json!({ "userId": id, "limit": 0, "jwtToken": token }),
            )
            .await;
        assert_eq!(body["counts"]["total"], 2);
    }

    #[tokio::test]
    async fn test_previous_no_timestamp_flag() {
        let harness = state();
        let (id, token) = harness.user("ada").await;
        complete(&harness, id, "stamped", TimeDelta::hours(1)).await;
        // Completed before stamps were recorded.
        let legacy = Todo {
            id: TodoId::generate(now()),
            owner: id,
            title: "legacy".into(),
            description: String::new(),
            completed: true,
            created_at: now() - TimeDelta::days(40),
            start_date: None,
            due_date: None,
            completed_at: None,
            priority: Priority::Low,
        };
        harness.state.db.todos.insert(&legacy).await.unwrap();

        for (flag, expected) in [
            (json!("false"), 0),
            (json!(false), 0),
            (json!("true"), 1),
            (json!(3), 1),
        ] {
            let (status, body) = harness
                .post(
                    "/api/previous",
                    json!({ "userId": id, "includeNoTimestamp": flag, "jwtToken": token }),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "{flag}");
            assert_eq!(body["noTimestamp"].as_array().unwrap().len(), expected, "{flag}");
            assert_eq!(body["today"][0]["title"], "stamped");
        }
    }

    #[tokio::test]
    async fn test_previous_rejections() {
        let harness = state();
        let (_, token) = harness.user("ada").await;

        let (status, body) = harness
            .post("/api/previous", json!({ "jwtToken": token }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "userId is required");

        let (status, body) = harness
            .post("/api/previous", json!({ "userId": 99, "jwtToken": token }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["jwtToken"].as_str().map(str::is_empty), Some(false));
    }
}
