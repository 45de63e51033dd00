//! Closed date-range primitive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::ticks::to_ticks;

/// A closed interval `[start, end]` over wall-clock instants.
///
/// Adjacency is tick-tolerant: two ranges separated by at most one 100 ns
/// tick count as adjacent. Monthly files end at `23:59:59.9999999` and the
/// next begins at `00:00:00.0000000`, exactly one tick later, so the
/// tolerant rule is what lets month-boundary data merge into one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// Build a range, rejecting `end < start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(VaultError::InvalidArgument(format!(
                "range end {end} precedes start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Whether the gap between the two ranges, in either direction, is at
    /// most one tick.
    pub fn adjacent_to(&self, other: &DateRange) -> bool {
        let gap = if other.start > self.end {
            to_ticks(other.start) - to_ticks(self.end)
        } else if self.start > other.end {
            to_ticks(self.start) - to_ticks(other.end)
        } else {
            0
        };
        gap <= 1
    }

    /// The overlapping sub-range, if any.
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        if !self.overlaps(other) {
            return None;
        }
        Some(DateRange {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    /// Union of two overlapping or adjacent ranges.
    pub fn merge(&self, other: &DateRange) -> Result<DateRange> {
        if !self.overlaps(other) && !self.adjacent_to(other) {
            return Err(VaultError::InvalidArgument(
                "cannot merge disjoint ranges".into(),
            ));
        }
        Ok(DateRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        })
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Span in ticks; zero for a degenerate single-instant range.
    pub fn tick_span(&self) -> i64 {
        to_ticks(self.end) - to_ticks(self.start)
    }
}
