//! Day timeline of the calendar view.
//!
//! A todo shows on the timeline when it has both a `startDate` and a
//! `dueDate`; the interval between them is what gets drawn.
mod layout;
mod status;

pub use layout::*;
pub use status::*;

use chrono::{NaiveDate, TimeZone};

use crate::todo::Todo;

/// Todos starting on `day` in `tz`, earliest first.
pub fn tasks_for_day<'a, Tz: TimeZone>(
    todos: &'a [Todo],
    day: NaiveDate,
    tz: &Tz,
) -> Vec<&'a Todo> {
    let mut tasks: Vec<&Todo> = todos
        .iter()
        .filter(|todo| {
            todo.start_date
                .is_some_and(|start| start.with_timezone(tz).date_naive() == day)
        })
        .collect();

    tasks.sort_by_key(|todo| todo.start_date);
    tasks
}
