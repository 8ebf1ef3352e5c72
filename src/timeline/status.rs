use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::todo::{Todo, TodoId};

/// How a task relates to the current time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Completed,
    Overdue,
    InProgress,
    Upcoming,
}

impl TaskStatus {
    /// Tasks missing a start or a due date are upcoming.
    pub fn of(todo: &Todo, now: DateTime<Utc>) -> Self {
        if todo.completed {
            return Self::Completed;
        }

        let (Some(start), Some(due)) = (todo.start_date, todo.due_date) else {
            return Self::Upcoming;
        };

        if now > due {
            Self::Overdue
        } else if now >= start {
            Self::InProgress
        } else {
            Self::Upcoming
        }
    }
}

/// Remembers task statuses between two ticks of a minute timer.
#[derive(Debug, Default)]
pub struct StatusTracker {
    statuses: HashMap<TodoId, TaskStatus>,
}

impl StatusTracker {
    pub fn new(todos: &[Todo], now: DateTime<Utc>) -> Self {
        Self {
            statuses: Self::compute(todos, now),
        }
    }

    fn compute(todos: &[Todo], now: DateTime<Utc>) -> HashMap<TodoId, TaskStatus> {
        todos
            .iter()
            .map(|todo| (todo.id.clone(), TaskStatus::of(todo, now)))
            .collect()
    }

    pub fn status(&self, id: &TodoId) -> Option<TaskStatus> {
        self.statuses.get(id).copied()
    }

    /// Recompute every status at `now`. Returns whether a redraw is needed,
    /// that is a task was added, removed or changed status.
    pub fn refresh(&mut self, todos: &[Todo], now: DateTime<Utc>) -> bool {
        let statuses = Self::compute(todos, now);
        let changed = statuses.len() != self.statuses.len()
            || statuses
                .iter()
                .any(|(id, status)| self.statuses.get(id) != Some(status));

        if changed {
            self.statuses = statuses;
        }
        changed
    }
}
