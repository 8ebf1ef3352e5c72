//! Pixel geometry of a one-day timeline.
//!
//! The day is drawn as 24 hour slots stacked vertically. A slot starts at
//! the base hour height and grows so that short tasks stay legible and
//! tasks sharing an hour fit. Tasks overlapping in time are laid out side
//! by side in columns.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;

use crate::date::resolve_local;
use crate::todo::{Todo, TodoId};

/// Smallest height, in pixels, at which a task title is readable.
pub const MIN_TASK_HEIGHT: f64 = 36.0;
/// A slot never grows past this multiple of the base height to fit a short task.
pub const MAX_EXPANSION: f64 = 4.0;
pub const DEFAULT_HOUR_HEIGHT: f64 = 60.0;

const HOURS: usize = 24;
const OVERSIZED_DAYS: i64 = 7;

/// Displayed day and measured grid dimensions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grid {
    pub day: NaiveDate,
    /// Base height of one hour slot.
    pub hour_height: f64,
    /// Offset of midnight from the top of the task container.
    pub base_offset: f64,
}

impl Grid {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            hour_height: DEFAULT_HOUR_HEIGHT,
            base_offset: 0.0,
        }
    }
}

/// Where a task is drawn. `left` and `width` are percentages.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub id: TodoId,
    pub top: f64,
    pub height: f64,
    pub left: f64,
    pub width: f64,
    /// Longer than a week; likely drawn wrong.
    pub oversized: bool,
}

impl Placement {
    fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub day: NaiveDate,
    /// Height of each hour slot, midnight first.
    pub slots: Vec<f64>,
    pub placements: Vec<Placement>,
    #[serde(skip)]
    bounds: Vec<DateTime<Utc>>,
    #[serde(skip)]
    base_offset: f64,
}

impl Layout {
    /// Total height of the grid.
    pub fn height(&self) -> f64 {
        self.slots.iter().sum()
    }

    /// Vertical position of `at`, clamped to the displayed day.
    pub fn offset(&self, at: DateTime<Utc>) -> f64 {
        offset(&self.bounds, &self.slots, self.base_offset, at)
    }

    pub fn placement(&self, id: &TodoId) -> Option<&Placement> {
        self.placements.iter().find(|p| &p.id == id)
    }
}

/// Interval of a drawable task.
#[derive(Debug)]
struct Span {
    id: TodoId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    oversized: bool,
}

impl Span {
    /// Both dates must be set, and the task must last.
    fn new(todo: &Todo) -> Option<Self> {
        let (start, end) = (todo.start_date?, todo.due_date?);
        if end <= start {
            tracing::debug!(todo = %todo.id, "task without duration left off the timeline");
            return None;
        }

        let oversized = end - start > TimeDelta::days(OVERSIZED_DAYS);
        if oversized {
            tracing::warn!(todo = %todo.id, "task lasts more than seven days, it may display incorrectly");
        }

        Some(Self {
            id: todo.id.clone(),
            start,
            end,
            oversized,
        })
    }

    fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.end > start && self.start < end
    }

    /// Minutes of the task falling inside `start..end`.
    fn minutes_within(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
        minutes(self.start.max(start), self.end.min(end)).max(0.0)
    }
}

fn minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 60_000.0
}

/// Instants at which each local hour of `day` starts, plus the next midnight.
fn hour_bounds<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Vec<DateTime<Utc>> {
    let next_day = day.checked_add_days(Days::new(1)).unwrap_or(day);
    let mut bounds: Vec<DateTime<Utc>> = Vec::with_capacity(HOURS + 1);

    for hour in 0..=HOURS {
        let naive = match NaiveTime::from_hms_opt(hour as u32, 0, 0) {
            Some(time) => day.and_time(time),
            None => next_day.and_time(NaiveTime::MIN),
        };
        let previous = bounds.last().copied();
        let bound = resolve_local(tz, naive)
            .map(|at| at.with_timezone(&Utc))
            .or_else(|| previous.map(|p| p + TimeDelta::hours(1)))
            .unwrap_or_else(|| naive.and_utc());

        // Hours skipped by a DST change collapse to nothing.
        bounds.push(previous.map_or(bound, |p| bound.max(p)));
    }

    bounds
}

fn offset(bounds: &[DateTime<Utc>], slots: &[f64], base: f64, at: DateTime<Utc>) -> f64 {
    let mut top = base;
    for (hour, slot) in slots.iter().enumerate() {
        let (start, end) = (bounds[hour], bounds[hour + 1]);
        if at < end {
            if at > start {
                top += slot * minutes(start, at) / 60.0;
            }
            return top;
        }
        top += slot;
    }
    top
}

/// Greedy first-fit: each span goes into the first column where it
/// overlaps nobody. `spans` must be sorted by start.
fn columns<'a>(spans: impl IntoIterator<Item = (usize, &'a Span)>) -> Vec<Vec<usize>> {
    let mut columns: Vec<Vec<(usize, &Span)>> = Vec::new();
    for (index, span) in spans {
        let free = columns
            .iter()
            .position(|column| column.iter().all(|(_, other)| !span.overlaps(other.start, other.end)));
        match free {
            Some(column) => columns[column].push((index, span)),
            None => columns.push(vec![(index, span)]),
        }
    }

    columns
        .into_iter()
        .map(|column| column.into_iter().map(|(index, _)| index).collect())
        .collect()
}

/// Height of every hour slot before any nudging.
fn size_slots(spans: &[Span], bounds: &[DateTime<Utc>], base: f64) -> Vec<f64> {
    let cap = base * MAX_EXPANSION;

    (0..HOURS)
        .map(|hour| {
            let (start, end) = (bounds[hour], bounds[hour + 1]);
            let inside: Vec<(usize, &Span)> = spans
                .iter()
                .enumerate()
                .filter(|(_, span)| span.overlaps(start, end))
                .collect();
            if inside.is_empty() {
                return base;
            }

            // Tall enough for the shortest segment to reach the minimum height.
            let height = inside
                .iter()
                .map(|(_, span)| span.minutes_within(start, end))
                .filter(|minutes| *minutes > 0.0)
                .map(|minutes| (MIN_TASK_HEIGHT * 60.0 / minutes).min(cap))
                .fold(base, f64::max);

            let stacked = columns(inside)
                .iter()
                .map(|column| {
                    column
                        .iter()
                        .map(|&i| height * spans[i].minutes_within(start, end) / 60.0)
                        .sum::<f64>()
                })
                .fold(0.0, f64::max);

            height.max(stacked)
        })
        .collect()
}

/// Lay out `todos` on `grid.day` in `tz`.
///
/// Tasks crossing midnight are cut at the day boundaries. The result only
/// depends on the inputs.
pub fn layout<Tz: TimeZone>(todos: &[Todo], grid: &Grid, tz: &Tz) -> Layout {
    let bounds = hour_bounds(grid.day, tz);
    let (day_start, day_end) = (bounds[0], bounds[HOURS]);
    let base = grid.base_offset;

    let mut spans: Vec<Span> = todos
        .iter()
        .filter_map(Span::new)
        .filter(|span| span.overlaps(day_start, day_end))
        .collect();
    spans.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.as_str().cmp(b.id.as_str())));

    let mut slots = size_slots(&spans, &bounds, grid.hour_height);

    let mut placements: Vec<Placement> = spans
        .iter()
        .map(|span| {
            let top = offset(&bounds, &slots, base, span.start.max(day_start));
            let bottom = offset(&bounds, &slots, base, span.end.min(day_end));
            Placement {
                id: span.id.clone(),
                top,
                height: (bottom - top).max(MIN_TASK_HEIGHT),
                left: 0.0,
                width: 100.0,
                oversized: span.oversized,
            }
        })
        .collect();
    let natural: Vec<f64> = placements.iter().map(|p| p.top).collect();

    let columns = columns(spans.iter().enumerate());
    let count = columns.len().max(1) as f64;
    for (index, column) in columns.iter().enumerate() {
        // A task drawn taller than its duration can cover the next one.
        for pair in column.windows(2) {
            let bottom = placements[pair[0]].bottom();
            let next = &mut placements[pair[1]];
            if next.top < bottom {
                next.top = bottom;
            }
        }
        for &i in column {
            placements[i].width = 100.0 / count;
            placements[i].left = index as f64 * 100.0 / count;
        }
    }

    let nudged: Vec<bool> = placements
        .iter()
        .zip(&natural)
        .map(|(placement, top)| placement.top > top + 1.0)
        .collect();
    if nudged.contains(&true) {
        let initial = slots.clone();
        let mut hour_top = base;

        for hour in 0..HOURS {
            let hour_bottom = hour_top + initial[hour];
            let mut lowest = hour_top;

            for (i, span) in spans.iter().enumerate() {
                if !span.overlaps(bounds[hour], bounds[hour + 1]) {
                    continue;
                }
                let placement = &placements[i];
                if !nudged[i] {
                    lowest = lowest.max(placement.bottom().min(hour_bottom));
                } else if placement.top < hour_bottom {
                    lowest = lowest.max(placement.bottom());
                }
            }

            slots[hour] = initial[hour].max(lowest - hour_top);
            hour_top = hour_bottom;
        }
    }

    Layout {
        day: grid.day,
        slots,
        placements,
        bounds,
        base_offset: base,
    }
}

/// Position of the "now" line, when `now` falls on the displayed day.
pub fn current_time_indicator(layout: &Layout, now: DateTime<Utc>) -> Option<f64> {
    let (start, end) = (layout.bounds.first()?, layout.bounds.last()?);
    if now < *start || now >= *end {
        return None;
    }

    let top = layout.offset(now);
    Some(top.clamp(layout.base_offset, layout.base_offset + layout.height()))
}
