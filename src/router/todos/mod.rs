//! Todo HTTP API. Every route sits behind the credential guard.
mod add;
mod check;
mod current;
mod delete;
mod edit;
mod list;
mod next_day;
mod previous;

use axum::routing::post;
use axum::{Router, middleware};
use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::Value;

use crate::error::{Result, Scoped};
use crate::middleware::{Session, authenticate};
use crate::todo::TodoId;
use crate::user::parse_user_id;
use crate::{AppState, ServerError};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // `POST /api/addtodo` goes to `add`.
        .route("/addtodo", post(add::handler))
        .route("/deletetodo", post(delete::handler))
        .route("/edittodo", post(edit::handler))
        .route("/gettodos", post(list::handler))
        .route("/check", post(check::handler))
        .route("/check-bulk", post(check::bulk_handler))
        .route("/next-day", post(next_day::handler))
        .route("/current", post(current::handler))
        .route("/previous", post(previous::handler))
        .route_layer(middleware::from_fn_with_state(state, authenticate))
}

/// Syntactically valid todo identifier, or a `400`.
fn todo_id(raw: Option<&str>) -> Result<TodoId> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty());
    let Some(raw) = raw else {
        return Err(ServerError::BadRequest("id is required".into()));
    };

    TodoId::parse(raw).ok_or_else(|| ServerError::BadRequest("invalid id format".into()))
}

/// The `userId` sent by the client must be the caller.
fn authorize(session: &Session, user_id: Option<&Value>) -> Result<()> {
    if user_id.and_then(parse_user_id) == Some(session.user_id) {
        Ok(())
    } else {
        tracing::debug!(user_id = session.user_id, "userId does not match the credential");
        Err(ServerError::Forbidden("Not authorized for this user".into())).scoped(session)
    }
}

/// Current instant in the configured zone.
fn local_now(state: &AppState) -> DateTime<Tz> {
    state.clock.now().with_timezone(&state.config.tz())
}

/// Positive integer sent as a number or a numeric string.
fn count(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Boolean sent as JSON or as a `"true"`/`"false"` string.
fn flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::router::tests::{Harness, now};
    use crate::todo::{Priority, Todo};
    use crate::user::UserId;
    use crate::token::TokenManager;
    use chrono::TimeDelta;
    use serde_json::json;

    /// Store a todo for `owner` directly.
    pub async fn seed(harness: &Harness, owner: UserId, title: &str) -> Todo {
        let todo = Todo {
            id: TodoId::generate(now()),
            owner,
            title: title.into(),
            description: String::new(),
            completed: false,
            created_at: now() - TimeDelta::hours(1),
            start_date: None,
            due_date: None,
            completed_at: None,
            priority: Priority::Low,
        };
        harness.state.db.todos.insert(&todo).await.unwrap();
        todo
    }

    pub async fn fetch(harness: &Harness, owner: UserId, todo: &Todo) -> Todo {
        harness
            .state
            .db
            .todos
            .find(owner, &todo.id)
            .await
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_todo_id() {
        assert!(todo_id(Some("65a1b2c3d4e5f60718293a4b")).is_ok());
        assert!(matches!(
            todo_id(Some("  ")),
            Err(ServerError::BadRequest(msg)) if msg == "id is required"
        ));
        assert!(matches!(
            todo_id(Some("12")),
            Err(ServerError::BadRequest(msg)) if msg == "invalid id format"
        ));
    }

    #[test]
    fn test_flag() {
        assert_eq!(flag(Some(&json!(false))), Some(false));
        assert_eq!(flag(Some(&json!(" TRUE "))), Some(true));
        assert_eq!(flag(Some(&json!("false"))), Some(false));
        assert_eq!(flag(Some(&json!(3))), None);
        assert_eq!(flag(Some(&json!("nope"))), None);
        assert_eq!(flag(None), None);
    }

    #[test]
    fn test_authorize() {
        let session = Session {
            user_id: 7,
            token: "t".into(),
        };
        assert!(authorize(&session, Some(&json!(7))).is_ok());
        assert!(authorize(&session, Some(&json!("7"))).is_ok());
        assert!(authorize(&session, Some(&json!(8))).is_err());
        assert!(authorize(&session, None).is_err());
    }

    #[tokio::test]
    async fn test_guard_rejections() {
        let harness = crate::router::tests::state();
        let (id, _) = harness.user("ada").await;

        let (status, body) = harness
            .post("/api/gettodos", json!({ "userId": id }))
            .await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body["error"], "The JWT is no longer valid");
        assert_eq!(body["jwtToken"], "");

        let forged = TokenManager::new(Some("other-secret"), None)
            .issue("Ada", "Lovelace", id)
            .unwrap();
        let (status, body) = harness
            .post("/api/gettodos", json!({ "userId": id, "jwtToken": forged }))
            .await;
        assert_eq!(status, axum::http::StatusCode::OK);
        assert_eq!(body["error"], "The JWT is no longer valid");

        let anonymous = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &json!({ "firstName": "Ada", "lastName": "Lovelace", "iat": 0 }),
            &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        let (status, body) = harness
            .post("/api/gettodos", json!({ "userId": id, "jwtToken": anonymous }))
            .await;
        assert_eq!(status, axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unable to determine user from token");
    }
}
