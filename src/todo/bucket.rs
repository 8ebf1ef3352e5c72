//! Split todos into named time buckets relative to a reference instant.
//!
//! Day boundaries are calendar days in the zone of `now`.

use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::date::{add_days, days_ago, end_of_day, start_of_day};
use crate::todo::Todo;

/// Open todos by due date.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Current {
    pub overdue: Vec<Todo>,
    pub today: Vec<Todo>,
    pub upcoming: Vec<Todo>,
    pub no_due: Vec<Todo>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentCounts {
    pub overdue: usize,
    pub today: usize,
    pub upcoming: usize,
    pub no_due: usize,
    pub total: usize,
}

impl Current {
    pub fn counts(&self) -> CurrentCounts {
        let overdue = self.overdue.len();
        let today = self.today.len();
        let upcoming = self.upcoming.len();
        let no_due = self.no_due.len();

        CurrentCounts {
            overdue,
            today,
            upcoming,
            no_due,
            total: overdue + today + upcoming + no_due,
        }
    }
}

/// Completed todos by completion date.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Previous {
    pub today: Vec<Todo>,
    pub yesterday: Vec<Todo>,
    pub last7: Vec<Todo>,
    pub last30: Vec<Todo>,
    pub older: Vec<Todo>,
    pub no_timestamp: Vec<Todo>,
    #[serde(skip)]
    fetched: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousCounts {
    pub today: usize,
    pub yesterday: usize,
    pub last7: usize,
    pub last30: usize,
    pub older: usize,
    pub no_timestamp: usize,
    /// Completed todos considered, including skipped ones.
    pub total: usize,
}

impl Previous {
    pub fn counts(&self) -> PreviousCounts {
        PreviousCounts {
            today: self.today.len(),
            yesterday: self.yesterday.len(),
            last7: self.last7.len(),
            last30: self.last30.len(),
            older: self.older.len(),
            no_timestamp: self.no_timestamp.len(),
            total: self.fetched,
        }
    }
}

fn desc_nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Latest completion first, then latest due date, then newest.
pub fn completion_order(a: &Todo, b: &Todo) -> Ordering {
    desc_nulls_last(&a.completed_at, &b.completed_at)
        .then_with(|| desc_nulls_last(&a.due_date, &b.due_date))
        .then_with(|| b.created_at.cmp(&a.created_at))
}

fn by_due(a: &Todo, b: &Todo) -> Ordering {
    a.due_date.cmp(&b.due_date)
}

/// Partition open todos into overdue, today, upcoming and undated.
///
/// `horizon_days` does not bound `upcoming`: due dates past it still land
/// there.
pub fn current<Tz: TimeZone>(
    todos: impl IntoIterator<Item = Todo>,
    now: &DateTime<Tz>,
    horizon_days: i64,
) -> Current {
    let today_start = start_of_day(now).with_timezone(&Utc);
    let today_end = end_of_day(now).with_timezone(&Utc);
    let horizon = end_of_day(&add_days(now, horizon_days)).with_timezone(&Utc);

    let mut buckets = Current::default();
    for todo in todos {
        match todo.due_date {
            None => buckets.no_due.push(todo),
            Some(due) if due < today_start => buckets.overdue.push(todo),
            Some(due) if due <= today_end => buckets.today.push(todo),
            Some(due) => {
                if due > horizon {
                    tracing::debug!(todo = %todo.id, %due, "due date past requested horizon");
                }
                buckets.upcoming.push(todo)
            },
        }
    }

    buckets.overdue.sort_by(by_due);
    buckets.today.sort_by(by_due);
    buckets.upcoming.sort_by(by_due);
    buckets.no_due.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    buckets
}

/// Partition completed todos by how long ago they were completed.
///
/// `todos` keeps its order inside each bucket.
pub fn previous<Tz: TimeZone>(
    todos: Vec<Todo>,
    now: &DateTime<Tz>,
    include_no_timestamp: bool,
) -> Previous {
    let yesterday = days_ago(now, 1);
    let today_start = start_of_day(now).with_timezone(&Utc);
    let today_end = end_of_day(now).with_timezone(&Utc);
    let yesterday_start = start_of_day(&yesterday).with_timezone(&Utc);
    let yesterday_end = end_of_day(&yesterday).with_timezone(&Utc);
    let last7_start = start_of_day(&days_ago(now, 7)).with_timezone(&Utc);
    let last30_start = start_of_day(&days_ago(now, 30)).with_timezone(&Utc);

    let mut buckets = Previous {
        fetched: todos.len(),
        ..Default::default()
    };
    for todo in todos {
        let Some(completed_at) = todo.completed_at else {
            if include_no_timestamp {
                buckets.no_timestamp.push(todo);
            }
            continue;
        };

        let bucket = if (today_start..=today_end).contains(&completed_at) {
            &mut buckets.today
        } else if (yesterday_start..=yesterday_end).contains(&completed_at) {
            &mut buckets.yesterday
        } else if (last7_start..yesterday_start).contains(&completed_at) {
            &mut buckets.last7
        } else if (last30_start..last7_start).contains(&completed_at) {
            &mut buckets.last30
        } else {
            &mut buckets.older
        };
        bucket.push(todo);
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todo::tests::todo;
    use chrono::TimeDelta;
    use chrono_tz::America::Los_Angeles;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 14, 0, 0).unwrap()
    }

    fn due(offset: TimeDelta) -> Todo {
        let mut todo = todo(now() - TimeDelta::days(40));
        todo.due_date = Some(now() + offset);
        todo
    }

    fn completed(offset: Option<TimeDelta>) -> Todo {
        let mut todo = todo(now() - TimeDelta::days(60));
        todo.completed = true;
        todo.completed_at = offset.map(|offset| now() - offset);
        todo
    }

    #[test]
    fn test_current_scenario() {
        let todos = vec![
            due(TimeDelta::days(3)),
            due(TimeDelta::zero()),
            due(-TimeDelta::days(2)),
        ];
        let buckets = current(todos, &now(), 7);

        assert_eq!(buckets.overdue.len(), 1);
        assert_eq!(buckets.today.len(), 1);
        assert_eq!(buckets.upcoming.len(), 1);
        assert_eq!(buckets.counts().total, 3);
        assert_eq!(buckets.today[0].due_date, Some(now()));
    }

    #[test]
    fn test_current_boundaries_and_order() {
        let midnight = start_of_day(&now());
        let late = due(TimeDelta::days(30));
        let mut undated_old = todo(now() - TimeDelta::days(3));
        undated_old.title = "old".into();
        let mut undated_new = todo(now() - TimeDelta::days(1));
        undated_new.title = "new".into();

        let mut at_midnight = due(TimeDelta::zero());
        at_midnight.due_date = Some(midnight);
        let mut before_midnight = due(TimeDelta::zero());
        before_midnight.due_date = Some(midnight - TimeDelta::milliseconds(1));
        let mut end = due(TimeDelta::zero());
        end.due_date = Some(end_of_day(&now()));

        let todos = vec![
            late.clone(),
            due(TimeDelta::days(1)),
            undated_old,
            at_midnight,
            before_midnight,
            end,
            undated_new,
        ];
        let buckets = current(todos, &now(), 7);

        assert_eq!(buckets.overdue.len(), 1);
        assert_eq!(buckets.today.len(), 2);
        // Past the horizon still counts as upcoming.
        assert_eq!(buckets.upcoming.len(), 2);
        assert_eq!(buckets.upcoming[1].id, late.id);
        assert_eq!(buckets.no_due[0].title, "new");
        assert_eq!(buckets.no_due[1].title, "old");
        assert!(buckets.today[0].due_date <= buckets.today[1].due_date);

        let counts = buckets.counts();
        assert_eq!(
            counts.overdue + counts.today + counts.upcoming + counts.no_due,
            counts.total
        );
        assert_eq!(counts.total, 7);
    }

    #[test]
    fn test_current_uses_local_days() {
        // 14:00 UTC is 07:00 in Los Angeles; 06:00 UTC the same day is still
        // the previous local day.
        let local = now().with_timezone(&Los_Angeles);
        let mut late_night = due(TimeDelta::zero());
        late_night.due_date = Some(Utc.with_ymd_and_hms(2025, 6, 15, 6, 0, 0).unwrap());

        let buckets = current(vec![late_night.clone()], &local, 7);
        assert_eq!(buckets.overdue.len(), 1);

        let buckets = current(vec![late_night], &now(), 7);
        assert_eq!(buckets.today.len(), 1);
    }

    #[test]
    fn test_previous_buckets() {
        let todos = vec![
            completed(Some(TimeDelta::hours(1))),
            completed(Some(TimeDelta::days(1))),
            completed(Some(TimeDelta::days(3))),
            completed(Some(TimeDelta::days(7))),
            completed(Some(TimeDelta::days(12))),
            completed(Some(TimeDelta::days(45))),
            completed(None),
        ];
        let buckets = previous(todos, &now(), true);
        let counts = buckets.counts();

        assert_eq!(counts.today, 1);
        assert_eq!(counts.yesterday, 1);
        assert_eq!(counts.last7, 2);
        assert_eq!(counts.last30, 1);
        assert_eq!(counts.older, 1);
        assert_eq!(counts.no_timestamp, 1);
        assert_eq!(counts.total, 7);
    }

    #[test]
    fn test_previous_without_timestamps() {
        let todos = vec![completed(None), completed(Some(TimeDelta::hours(2)))];
        let buckets = previous(todos, &now(), false);
        let counts = buckets.counts();

        assert_eq!(counts.no_timestamp, 0);
        assert_eq!(counts.today, 1);
        assert_eq!(counts.total, 2);
    }

    #[test]
    fn test_completion_order() {
        let recent = completed(Some(TimeDelta::hours(1)));
        let old = completed(Some(TimeDelta::days(4)));
        let mut undated_due = completed(None);
        undated_due.due_date = Some(now());
        let undated = completed(None);

        let mut todos = vec![undated.clone(), old.clone(), undated_due.clone(), recent.clone()];
        todos.sort_by(completion_order);

        assert_eq!(
            todos.iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
            vec![recent.id, old.id, undated_due.id, undated.id]
        );
    }
}
