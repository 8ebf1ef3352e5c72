use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use crate::AppState;
use crate::date::parse_date;
use crate::error::{Result, Scoped};
use crate::middleware::Session;
use crate::router::{Valid, not_blank, present};
use crate::todo::{Priority, Todo, TodoId};

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "owner_and_title"))]
pub struct Body {
    #[serde(default)]
    user_id: Value,
    #[serde(default, deserialize_with = "crate::router::lenient_string")]
    title: Option<String>,
    #[serde(default)]
    description: Value,
    #[serde(default)]
    created_at: Value,
    #[serde(default)]
    start_date: Value,
    #[serde(default)]
    due_date: Value,
    #[serde(default)]
    priority: Value,
}

fn owner_and_title(body: &Body) -> std::result::Result<(), ValidationError> {
    let title = body.title.as_deref().unwrap_or_default();
    present(&body.user_id)
        .and_then(|_| not_blank(title))
        .map_err(|err| err.with_message("userId and title are required".into()))
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: TodoId,
    pub error: String,
    pub jwt_token: String,
}

/// Handler to create a todo for the caller.
pub async fn handler(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Valid(body): Valid<Body>,
) -> Result<Json<Response>> {
    super::authorize(&session, Some(&body.user_id))?;

    let tz = state.config.tz();
    let now = state.clock.now();
    let todo = Todo {
        id: TodoId::generate(now),
        owner: session.user_id,
        title: body.title.unwrap_or_default().trim().to_owned(),
        description: body
            .description
            .as_str()
            .map(|d| d.trim().to_owned())
            .unwrap_or_default(),
        completed: false,
        created_at: parse_date(&body.created_at, &tz).unwrap_or(now),
        start_date: parse_date(&body.start_date, &tz),
        due_date: parse_date(&body.due_date, &tz),
        completed_at: None,
        priority: Priority::normalize(body.priority.as_str().unwrap_or_default()),
    };

    state.db.todos.insert(&todo).await.scoped(&session)?;
    tracing::debug!(user_id = session.user_id, todo = %todo.id, "todo created");

    Ok(Json(Response {
        id: todo.id,
        error: String::default(),
        jwt_token: session.token,
    }))
}
