//! Streaming OHLCV aggregation.
//!
//! Rolls a sorted sequence of fine-grained candles into coarser target
//! periods: open from the first bar of a period, close from the last, high
//! and low over the group, volume summed. Real feeds jitter close
//! timestamps by a few ticks, so a group's close time is preserved verbatim
//! when it lands within one second of the conventional period bound.

use chrono::{DateTime, Utc};

use crate::candle::Candle;
use crate::error::{Result, VaultError};
use crate::interval::Interval;
use crate::ticks::{self, TICKS_PER_SECOND};

/// Roll up `candles` (sorted by `open_time`, in `source`) into `target`
/// periods. A trailing partial period still emits one candle.
pub fn aggregate(candles: &[Candle], source: Interval, target: Interval) -> Result<Vec<Candle>> {
    if !source.can_aggregate(target) {
        return Err(VaultError::AggregationIncompatible {
            from: source,
            to: target,
        });
    }

    let target_ticks = target.seconds()? * TICKS_PER_SECOND;
    let mut out = Vec::with_capacity(candles.len() / source.factor(target)? as usize + 1);

    let mut group: Option<GroupAccumulator> = None;
    for candle in candles {
        let period = target.align(candle.open_time)?;
        match &mut group {
            Some(acc) if acc.period == period => acc.push(candle),
            Some(acc) => {
                out.push(acc.finish(target_ticks));
                group = Some(GroupAccumulator::start(period, candle));
            }
            None => group = Some(GroupAccumulator::start(period, candle)),
        }
    }
    if let Some(acc) = group {
        out.push(acc.finish(target_ticks));
    }
    Ok(out)
}

/// Reduce any non-empty sequence to exactly one candle.
pub fn aggregate_to_single(candles: &[Candle]) -> Result<Candle> {
    let (first, rest) = candles.split_first().ok_or_else(|| {
        VaultError::InvalidArgument("cannot aggregate an empty candle sequence".into())
    })?;

    let mut acc = *first;
    for candle in rest {
        acc.high = acc.high.max(candle.high);
        acc.low = acc.low.min(candle.low);
        acc.volume += candle.volume;
    }
    if let Some(last) = rest.last() {
        acc.close_time = last.close_time;
        acc.close = last.close;
    }
    Ok(acc)
}

/// Aggregate one source sequence into several targets at once.
///
/// Targets are processed smallest first; when the next target is an exact
/// multiple of the previous one, the previous output is reused as the
/// input, which touches far fewer candles than re-reading the source.
/// Either way the result is identical to aggregating straight from source.
pub fn aggregate_to_multiple(
    candles: &[Candle],
    source: Interval,
    targets: &[Interval],
) -> Result<Vec<(Interval, Vec<Candle>)>> {
    let mut ordered: Vec<Interval> = targets.to_vec();
    ordered.sort_by_key(|i| i.try_seconds());
    ordered.dedup();

    let mut out: Vec<(Interval, Vec<Candle>)> = Vec::with_capacity(ordered.len());
    for target in ordered {
        let rolled = match out.last() {
            Some((prev, prev_candles)) if prev.can_aggregate(target) => {
                aggregate(prev_candles, *prev, target)?
            }
            _ => aggregate(candles, source, target)?,
        };
        out.push((target, rolled));
    }
    Ok(out)
}

/// Whether `candles` is a plausible `expected_interval` sequence:
/// `open_time` monotonic non-decreasing, and every non-terminal candle's
/// span within one second of the interval duration.
pub fn validate_sequence(candles: &[Candle], expected_interval: Interval) -> bool {
    let expected_ticks = expected_interval.try_seconds().map(|s| s * TICKS_PER_SECOND);

    for pair in candles.windows(2) {
        if pair[1].open_time < pair[0].open_time {
            return false;
        }
    }
    if let Some(expected) = expected_ticks {
        for candle in candles.iter().take(candles.len().saturating_sub(1)) {
            let span =
                ticks::to_ticks(candle.close_time) - ticks::to_ticks(candle.open_time) + 1;
            if (span - expected).abs() > TICKS_PER_SECOND {
                return false;
            }
        }
    }
    true
}

struct GroupAccumulator {
    period: DateTime<Utc>,
    first: Candle,
    last_close_time: DateTime<Utc>,
    last_close: rust_decimal::Decimal,
    high: rust_decimal::Decimal,
    low: rust_decimal::Decimal,
    volume: rust_decimal::Decimal,
}

impl GroupAccumulator {
    fn start(period: DateTime<Utc>, candle: &Candle) -> Self {
        Self {
            period,
            first: *candle,
            last_close_time: candle.close_time,
            last_close: candle.close,
            high: candle.high,
            low: candle.low,
            volume: candle.volume,
        }
    }

    fn push(&mut self, candle: &Candle) {
        self.high = self.high.max(candle.high);
        self.low = self.low.min(candle.low);
        self.volume += candle.volume;
        self.last_close_time = candle.close_time;
        self.last_close = candle.close;
    }

    fn finish(&self, target_ticks: i64) -> Candle {
        let bound_ticks = ticks::to_ticks(self.first.open_time) + target_ticks - 1;
        let last_ticks = ticks::to_ticks(self.last_close_time);
        // Preserve a jittery close time only when it lands within one
        // second of the conventional bound.
        let close_time = if (last_ticks - bound_ticks).abs() <= TICKS_PER_SECOND {
            self.last_close_time
        } else {
            ticks::from_ticks(bound_ticks)
        };

        Candle {
            open_time: self.first.open_time,
            close_time,
            open: self.first.open,
            high: self.high,
            low: self.low,
            close: self.last_close,
            volume: self.volume,
        }
    }
}
