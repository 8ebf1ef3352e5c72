//! Todos owned by a single user.
pub mod bucket;
mod repository;

pub use repository::*;

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::user::UserId;

static TODO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[0-9a-fA-F]{24}$").expect("todo id pattern"));

/// Twelve bytes rendered as 24 hex characters: a big-endian creation
/// timestamp followed by random bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct TodoId(String);

impl TodoId {
    pub fn generate(created_at: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; 12];
        let seconds = created_at.timestamp().clamp(0, u32::MAX as i64) as u32;
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        OsRng.fill_bytes(&mut bytes[4..]);
        Self(hex::encode(bytes))
    }

    /// Accept only syntactically valid identifiers.
    pub fn parse(raw: &str) -> Option<Self> {
        TODO_ID
            .is_match(raw)
            .then(|| Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical priority. Stored as a PostgreSQL enum.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "priority")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    /// Case-insensitive match. Anything unknown is [`Priority::Low`].
    pub fn normalize(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Todo as saved on database, and as sent to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: TodoId,
    #[serde(skip)]
    pub owner: UserId,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    /// Set exactly while `completed` is true.
    pub completed_at: Option<DateTime<Utc>>,
    pub priority: Priority,
}

/// Partial update. For dates, `Some(None)` clears the field while `None`
/// leaves it untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub start_date: Option<Option<DateTime<Utc>>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<Priority>,
}

impl TodoPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply on `todo`, keeping `completed_at` in step with `completed`.
    /// Returns whether anything changed.
    pub fn apply(&self, todo: &mut Todo, now: DateTime<Utc>) -> bool {
        let before = todo.clone();

        if let Some(title) = &self.title {
            todo.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            todo.description.clone_from(description);
        }
        if let Some(completed) = self.completed {
            todo.set_completed(completed, now);
        }
        if let Some(start_date) = self.start_date {
            todo.start_date = start_date;
        }
        if let Some(due_date) = self.due_date {
            todo.due_date = due_date;
        }
        if let Some(priority) = self.priority {
            todo.priority = priority;
        }

        *todo != before
    }
}

impl Todo {
    /// Flip completion, stamping the time only on a false to true transition.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        if completed && !self.completed {
            self.completed_at = Some(now);
        } else if !completed {
            self.completed_at = None;
        }
        self.completed = completed;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    pub(crate) fn todo(created_at: DateTime<Utc>) -> Todo {
        Todo {
            id: TodoId::generate(created_at),
            owner: 1,
            title: "Write tests".into(),
            description: String::new(),
            completed: false,
            created_at,
            start_date: None,
            due_date: None,
            completed_at: None,
            priority: Priority::Low,
        }
    }

    #[test]
    fn test_normalize_priority() {
        for (input, expected) in [
            ("high", Priority::High),
            ("HIGH", Priority::High),
            ("High", Priority::High),
            ("medium", Priority::Medium),
            ("MeDiUm", Priority::Medium),
            ("low", Priority::Low),
            ("LOW", Priority::Low),
            ("", Priority::Low),
            ("urgent", Priority::Low),
            ("hi", Priority::Low),
        ] {
            assert_eq!(Priority::normalize(input), expected, "{input:?}");
        }
    }

    #[test]
    fn test_todo_id() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let id = TodoId::generate(now);

        assert_eq!(id.as_str().len(), 24);
        assert_eq!(TodoId::parse(id.as_str()), Some(id.clone()));
        assert_eq!(
            TodoId::parse("65A1B2C3D4E5F60718293A4B").map(|id| id.to_string()),
            Some("65a1b2c3d4e5f60718293a4b".to_owned())
        );
        assert_eq!(TodoId::parse("65a1b2c3d4e5f60718293a4"), None);
        assert_eq!(TodoId::parse("zza1b2c3d4e5f60718293a4b"), None);
        assert_eq!(TodoId::parse(""), None);
        assert_ne!(id, TodoId::generate(now));
    }

    #[test]
    fn test_completion_keeps_timestamp_in_step() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let mut todo = todo(now);

        todo.set_completed(true, now);
        assert!(todo.completed);
        assert_eq!(todo.completed_at, Some(now));

        // Completing again keeps the first stamp.
        todo.set_completed(true, now + TimeDelta::hours(1));
        assert_eq!(todo.completed_at, Some(now));

        todo.set_completed(false, now);
        assert!(!todo.completed);
        assert_eq!(todo.completed_at, None);
    }

    #[test]
    fn test_patch_due_date() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let due = Utc.with_ymd_and_hms(2025, 1, 3, 17, 0, 0).unwrap();
        let mut todo = todo(now);
        todo.due_date = Some(due);

        let clear = TodoPatch {
            due_date: Some(None),
            ..Default::default()
        };
        assert!(clear.apply(&mut todo, now));
        assert_eq!(todo.due_date, None);
        assert!(!clear.apply(&mut todo, now));

        let set = TodoPatch {
            due_date: Some(Some(due)),
            ..Default::default()
        };
        assert!(set.apply(&mut todo, now));
        assert_eq!(todo.due_date, Some(due));
        assert!(!set.apply(&mut todo, now));

        assert!(TodoPatch::default().is_empty());
        assert!(!set.is_empty());
    }
}
