//! Availability and range index.
//!
//! Answers "what does the vault hold for this symbol and interval" by
//! reading file headers only. Uncompressed files cost a 64-byte read;
//! compressed files must be decompressed in full first (there is no indexed
//! access into a gzip stream), which the scan accepts — correctness over
//! speed. A file whose header cannot be read is skipped and the scan
//! continues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::codec::{self, Header, HEADER_SIZE};
use crate::compression;
use crate::error::{Result, VaultError};
use crate::interval::Interval;
use crate::paths::{MonthFile, PathResolver, Scope};
use crate::range::DateRange;
use crate::ticks::{add_ticks, to_ticks};

/// What the header scan found for one query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub symbol: String,
    pub interval: Interval,
    /// Query bounds as given.
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Covered sub-ranges, merged with one-tick adjacency tolerance.
    pub available_ranges: Vec<DateRange>,
    /// Complement of the covered ranges within the query bounds.
    pub missing_ranges: Vec<DateRange>,
    /// Candle count estimated from headers, pro-rated to the query.
    pub estimated_count: i64,
    /// Candles a gapless feed would hold over the query span.
    pub expected_count: i64,
    /// Covered fraction of the query span, clamped to `[0, 1]`.
    pub coverage: f64,
}

impl AvailabilityReport {
    pub fn is_complete(&self) -> bool {
        self.missing_ranges.is_empty() && !self.available_ranges.is_empty()
    }
}

/// Read one month file's header, decompressing when needed.
pub async fn read_header(file: &MonthFile) -> Result<Header> {
    if file.compressed {
        let bytes = tokio::fs::read(&file.path).await?;
        let unpacked = compression::decompress_pooled(&bytes, bytes.len() * 4).await?;
        codec::decode_header(&unpacked)
    } else {
        let mut handle = tokio::fs::File::open(&file.path).await?;
        let mut prefix = [0u8; HEADER_SIZE];
        match handle.read_exact(&mut prefix).await {
            Ok(_) => codec::decode_header(&prefix),
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(VaultError::Truncated {
                    expected: HEADER_SIZE,
                    actual: 0,
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}

async fn read_header_lenient(file: &MonthFile) -> Option<Header> {
    match read_header(file).await {
        Ok(header) => Some(header),
        Err(err) => {
            debug!(path = %file.path.display(), %err, "skipping unreadable header");
            None
        }
    }
}

/// Earliest and latest stored instants, read from the chronologically first
/// and last files only. `None` when no files exist or both headers are
/// empty.
pub async fn data_bounds(
    resolver: &PathResolver,
    scope: Scope,
    symbol: &str,
    interval: Interval,
) -> Result<Option<DateRange>> {
    let files = resolver.list_month_files(scope, symbol, interval).await?;
    let (Some(first_file), Some(last_file)) = (files.first(), files.last()) else {
        return Ok(None);
    };

    let first_header = read_header_lenient(first_file).await;
    let last_header = if last_file.path == first_file.path {
        first_header
    } else {
        read_header_lenient(last_file).await
    };

    let first = first_header
        .and_then(|h| h.first_timestamp())
        .or_else(|| last_header.and_then(|h| h.first_timestamp()));
    let last = last_header
        .and_then(|h| h.last_timestamp())
        .or_else(|| first_header.and_then(|h| h.last_timestamp()));

    match (first, last) {
        (Some(start), Some(end)) if start <= end => Ok(Some(DateRange { start, end })),
        _ => Ok(None),
    }
}

/// Scan headers across the files intersecting `[start, end]` and report
/// covered ranges, gaps, and counts.
pub async fn check_availability(
    resolver: &PathResolver,
    scope: Scope,
    symbol: &str,
    interval: Interval,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<AvailabilityReport> {
    let query = DateRange { start, end };
    let files = resolver
        .month_files_in_range(scope, symbol, interval, Some(start), Some(end), true)
        .await?;

    let mut covered: Vec<DateRange> = Vec::new();
    let mut estimated_count: i64 = 0;

    for file in &files {
        let Some(header) = read_header_lenient(file).await else {
            continue;
        };
        if header.is_empty() {
            continue;
        }
        let (Some(file_start), Some(file_end)) = (header.first_timestamp(), header.last_timestamp())
        else {
            continue;
        };
        let Ok(file_range) = DateRange::new(file_start, file_end) else {
            continue;
        };
        let Some(clamped) = file_range.intersect(&query) else {
            continue;
        };

        let original_ticks = file_range.tick_span();
        estimated_count += if original_ticks > 0 {
            ceil_div_i128(
                header.record_count as i128 * clamped.tick_span() as i128,
                original_ticks as i128,
            )
        } else {
            header.record_count
        };
        covered.push(clamped);
    }

    covered.sort_by_key(|r| r.start);
    let available_ranges = merge_adjacent(covered);
    let missing_ranges = complement(&query, &available_ranges);

    let expected_count = if interval.is_standard() {
        interval.expected_count(start, end)?
    } else {
        0
    };

    let query_ticks = query.tick_span();
    let coverage = if query_ticks > 0 {
        let covered_ticks: i64 = available_ranges.iter().map(DateRange::tick_span).sum();
        (covered_ticks as f64 / query_ticks as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Ok(AvailabilityReport {
        symbol: symbol.to_string(),
        interval,
        start,
        end,
        available_ranges,
        missing_ranges,
        estimated_count,
        expected_count,
        coverage,
    })
}

fn ceil_div_i128(num: i128, den: i128) -> i64 {
    ((num + den - 1) / den) as i64
}

/// Merge sorted ranges using the one-tick adjacency rule. Adjacent monthly
/// files end at `23:59:59.9999999` and begin at `00:00:00.0000000`, one
/// tick apart, and must fold into a single run.
fn merge_adjacent(sorted: Vec<DateRange>) -> Vec<DateRange> {
    let mut out: Vec<DateRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match out.last_mut() {
            Some(prev) if prev.overlaps(&range) || prev.adjacent_to(&range) => {
                prev.end = prev.end.max(range.end);
            }
            _ => out.push(range),
        }
    }
    out
}

/// The query-span complement of merged coverage: prefix gap, inter-run gaps
/// wider than one tick, suffix gap.
fn complement(query: &DateRange, covered: &[DateRange]) -> Vec<DateRange> {
    let Some(first) = covered.first() else {
        return vec![*query];
    };

    let mut missing = Vec::new();
    if to_ticks(first.start) - to_ticks(query.start) > 1 {
        missing.push(DateRange {
            start: query.start,
            end: add_ticks(first.start, -1),
        });
    }
    for pair in covered.windows(2) {
        if to_ticks(pair[1].start) - to_ticks(pair[0].end) > 1 {
            missing.push(DateRange {
                start: add_ticks(pair[0].end, 1),
                end: add_ticks(pair[1].start, -1),
            });
        }
    }
    let last = covered.last().unwrap_or(first);
    if to_ticks(query.end) - to_ticks(last.end) > 1 {
        missing.push(DateRange {
            start: add_ticks(last.end, 1),
            end: query.end,
        });
    }
    missing
}
