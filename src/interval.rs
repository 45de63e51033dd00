//! Candle interval catalog.
//!
//! Nineteen intervals: the zero-duration `Tick` sentinel, seventeen standard
//! fixed spans from one second to one month, and the `Custom` sentinel for
//! data whose period the vault does not interpret. Each standard interval has
//! a stable short code used as a directory name on disk. Codes are
//! case-sensitive: `1m` is one minute, `1M` is one month.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::ticks::{self, TICKS_PER_SECOND};

/// A candle interval.
///
/// Variants are declared in ascending duration order; `standard()` relies on
/// this for its smallest-first ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// Zero-duration sentinel for raw tick data.
    Tick,
    /// One second.
    S1,
    /// One minute.
    M1,
    /// Three minutes.
    M3,
    /// Five minutes.
    M5,
    /// Ten minutes.
    M10,
    /// Fifteen minutes.
    M15,
    /// Thirty minutes.
    M30,
    /// One hour.
    H1,
    /// Two hours.
    H2,
    /// Four hours.
    H4,
    /// Six hours.
    H6,
    /// Eight hours.
    H8,
    /// Twelve hours.
    H12,
    /// One day.
    D1,
    /// Three days.
    D3,
    /// One week.
    W1,
    /// One month, fixed at thirty days.
    MN1,
    /// Sentinel for externally-defined periods.
    Custom,
}

/// All standard intervals, smallest first.
const STANDARD: [Interval; 17] = [
    Interval::S1,
    Interval::M1,
    Interval::M3,
    Interval::M5,
    Interval::M10,
    Interval::M15,
    Interval::M30,
    Interval::H1,
    Interval::H2,
    Interval::H4,
    Interval::H6,
    Interval::H8,
    Interval::H12,
    Interval::D1,
    Interval::D3,
    Interval::W1,
    Interval::MN1,
];

impl Interval {
    /// Duration in seconds, or `None` for `Tick` and `Custom`.
    pub const fn try_seconds(self) -> Option<i64> {
        match self {
            Interval::Tick | Interval::Custom => None,
            Interval::S1 => Some(1),
            Interval::M1 => Some(60),
            Interval::M3 => Some(180),
            Interval::M5 => Some(300),
            Interval::M10 => Some(600),
            Interval::M15 => Some(900),
            Interval::M30 => Some(1_800),
            Interval::H1 => Some(3_600),
            Interval::H2 => Some(7_200),
            Interval::H4 => Some(14_400),
            Interval::H6 => Some(21_600),
            Interval::H8 => Some(28_800),
            Interval::H12 => Some(43_200),
            Interval::D1 => Some(86_400),
            Interval::D3 => Some(259_200),
            Interval::W1 => Some(604_800),
            Interval::MN1 => Some(2_592_000),
        }
    }

    /// Duration in seconds; `Tick` and `Custom` are rejected.
    pub fn seconds(self) -> Result<i64> {
        self.try_seconds().ok_or_else(|| {
            VaultError::InvalidArgument(format!("interval {self} has no fixed duration"))
        })
    }

    /// Duration as a `chrono::Duration`; `Tick` and `Custom` are rejected.
    pub fn duration(self) -> Result<chrono::Duration> {
        Ok(chrono::Duration::seconds(self.seconds()?))
    }

    /// Whether this is one of the seventeen fixed-duration intervals.
    pub const fn is_standard(self) -> bool {
        self.try_seconds().is_some()
    }

    /// The short textual code, used verbatim as the on-disk directory name.
    pub const fn code(self) -> &'static str {
        match self {
            Interval::Tick => "tick",
            Interval::S1 => "1s",
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M10 => "10m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H8 => "8h",
            Interval::H12 => "12h",
            Interval::D1 => "1d",
            Interval::D3 => "3d",
            Interval::W1 => "1w",
            Interval::MN1 => "1M",
            Interval::Custom => "custom",
        }
    }

    /// Parse a short code. Case-sensitive: `1m` and `1M` are different
    /// intervals and must never be conflated.
    pub fn from_code(code: &str) -> Option<Interval> {
        match code {
            "tick" => Some(Interval::Tick),
            "1s" => Some(Interval::S1),
            "1m" => Some(Interval::M1),
            "3m" => Some(Interval::M3),
            "5m" => Some(Interval::M5),
            "10m" => Some(Interval::M10),
            "15m" => Some(Interval::M15),
            "30m" => Some(Interval::M30),
            "1h" => Some(Interval::H1),
            "2h" => Some(Interval::H2),
            "4h" => Some(Interval::H4),
            "6h" => Some(Interval::H6),
            "8h" => Some(Interval::H8),
            "12h" => Some(Interval::H12),
            "1d" => Some(Interval::D1),
            "3d" => Some(Interval::D3),
            "1w" => Some(Interval::W1),
            "1M" => Some(Interval::MN1),
            "custom" => Some(Interval::Custom),
            _ => None,
        }
    }

    /// The value stored in the file header's interval field.
    /// `Tick` stores 0 and `Custom` stores -1 so neither collides with a
    /// standard duration.
    pub const fn storage_seconds(self) -> i32 {
        match self.try_seconds() {
            Some(secs) => secs as i32,
            None => match self {
                Interval::Custom => -1,
                _ => 0,
            },
        }
    }

    /// Inverse of `storage_seconds`. Unknown positive durations map to
    /// `Custom` so files written by a newer catalog still decode.
    pub fn from_storage_seconds(secs: i32) -> Interval {
        if secs == 0 {
            return Interval::Tick;
        }
        STANDARD
            .iter()
            .copied()
            .find(|i| i.storage_seconds() == secs)
            .unwrap_or(Interval::Custom)
    }

    /// Round `t` down to the nearest multiple of this interval's duration
    /// from the epoch.
    pub fn align(self, t: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let dur_ticks = self.seconds()? * TICKS_PER_SECOND;
        let aligned = ticks::to_ticks(t).div_euclid(dur_ticks) * dur_ticks;
        Ok(ticks::from_ticks(aligned))
    }

    /// Whether candles in `self` can be rolled up into `target`: both
    /// standard, strictly finer, and an exact divisor of the target span.
    pub fn can_aggregate(self, target: Interval) -> bool {
        match (self.try_seconds(), target.try_seconds()) {
            (Some(a), Some(b)) => a < b && b % a == 0,
            _ => false,
        }
    }

    /// How many candles of `self` make one candle of `target`.
    pub fn factor(self, target: Interval) -> Result<i64> {
        if !self.can_aggregate(target) {
            return Err(VaultError::AggregationIncompatible {
                from: self,
                to: target,
            });
        }
        Ok(target.seconds()? / self.seconds()?)
    }

    /// Number of candles of this interval expected to cover `[start, end]`,
    /// rounded up.
    pub fn expected_count(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let dur_ticks = self.seconds()? * TICKS_PER_SECOND;
        let span = (ticks::to_ticks(end) - ticks::to_ticks(start)).max(0);
        Ok((span + dur_ticks - 1).div_euclid(dur_ticks))
    }

    /// All standard intervals, smallest first.
    pub fn standard() -> &'static [Interval] {
        &STANDARD
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Interval {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        Interval::from_code(s)
            .ok_or_else(|| VaultError::InvalidArgument(format!("unknown interval code {s:?}")))
    }
}
