//! Pure boundary predicates.
//!
//! Each [`BoundaryKind`] decides, from a `(previous, current)` pair of
//! virtual instants, whether its calendar boundary was crossed. Predicates
//! are pure functions of the pair: no hidden state, no system clock reads.
//! Backwards jumps (`current <= previous`) never fire.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// The calendar boundaries the clock can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// The hour component ticked over.
    NewHour,
    /// The transition crossed or landed past 12:00 for a calendar day.
    AtNoon,
    /// The calendar date changed.
    NewDay,
    /// A new ISO week began (Monday-based).
    WeekStart,
    /// A Sunday → Monday transition, i.e. the Monday anchoring the week
    /// changed.
    WeekEnd,
}

impl BoundaryKind {
    /// All kinds in their fixed evaluation order.
    pub const ALL: [BoundaryKind; 5] = [
        BoundaryKind::NewHour,
        BoundaryKind::AtNoon,
        BoundaryKind::NewDay,
        BoundaryKind::WeekStart,
        BoundaryKind::WeekEnd,
    ];

    /// Stable name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            BoundaryKind::NewHour => "new-hour",
            BoundaryKind::AtNoon => "at-noon",
            BoundaryKind::NewDay => "new-day",
            BoundaryKind::WeekStart => "week-start",
            BoundaryKind::WeekEnd => "week-end",
        }
    }

    /// Whether this boundary was crossed between `prev` and `curr`.
    pub fn should_fire(&self, prev: DateTime<Utc>, curr: DateTime<Utc>) -> bool {
        if curr <= prev {
            return false;
        }
        match self {
            BoundaryKind::NewHour => floor_to_hour(curr) > floor_to_hour(prev),
            BoundaryKind::AtNoon => {
                if prev.date_naive() == curr.date_naive() {
                    prev.hour() < 12 && curr.hour() >= 12
                } else {
                    // A jump that overshoots noon fires once for the
                    // landing day.
                    curr.hour() >= 12
                }
            }
            BoundaryKind::NewDay => prev.date_naive() != curr.date_naive(),
            BoundaryKind::WeekStart => {
                let (p, c) = (prev.iso_week(), curr.iso_week());
                p.week() != c.week() || p.year() != c.year()
            }
            BoundaryKind::WeekEnd => {
                monday_of_week(prev) != monday_of_week(curr) || curr - prev >= Duration::days(7)
            }
        }
    }
}

impl std::fmt::Display for BoundaryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn floor_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

fn monday_of_week(t: DateTime<Utc>) -> NaiveDate {
    let date = t.date_naive();
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}
