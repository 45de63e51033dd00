//! Filesystem layout and enumeration.
//!
//! Authoritative layout, one file per calendar month:
//!
//! ```text
//! <base>/<sanitized-symbol>/<short-code>/<YYYY>/<MM>.bin
//! <base>/<sanitized-symbol>/<short-code>/<YYYY>/<MM>.bin.gz
//! ```
//!
//! Exactly one of the two extensions should exist per month; when both are
//! present (a crash between write-new and delete-old) readers prefer the
//! compressed file deterministically.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::interval::Interval;

/// Where a vault's base directory lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// `./data/history-vault` under the current working directory.
    #[default]
    Local,
    /// `HistoryVault` under the OS temporary directory.
    Global,
}

/// Relative base for `Scope::Local`.
pub const LOCAL_BASE: &str = "data/history-vault";

/// Directory name under the OS temp dir for `Scope::Global`.
pub const GLOBAL_DIR_NAME: &str = "HistoryVault";

/// Extension for uncompressed month files.
pub const EXT_PLAIN: &str = ".bin";

/// Extension for gzip month files.
pub const EXT_COMPRESSED: &str = ".bin.gz";

/// Characters never allowed in a stored symbol directory name: the portable
/// superset of path-illegal filename characters across supported hosts.
const ILLEGAL: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

/// Replace path-illegal characters with `_`. The caller-visible symbol
/// string is never altered; only the directory name is.
pub fn sanitize_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .map(|c| {
            if ILLEGAL.contains(&c) || c.is_ascii_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// One existing month file on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonthFile {
    pub path: PathBuf,
    pub year: i32,
    pub month: u32,
    pub compressed: bool,
}

/// Maps (scope, symbol, interval, year, month) to paths and enumerates what
/// already exists.
#[derive(Clone, Debug, Default)]
pub struct PathResolver {
    base_override: Option<PathBuf>,
}

impl PathResolver {
    pub fn new(base_override: Option<PathBuf>) -> Self {
        Self { base_override }
    }

    /// Base directory for a scope. A configured override supersedes both
    /// scope conventions.
    pub fn base_dir(&self, scope: Scope) -> PathBuf {
        if let Some(base) = &self.base_override {
            return base.clone();
        }
        match scope {
            Scope::Local => PathBuf::from(LOCAL_BASE),
            Scope::Global => std::env::temp_dir().join(GLOBAL_DIR_NAME),
        }
    }

    pub fn symbol_dir(&self, scope: Scope, symbol: &str) -> PathBuf {
        self.base_dir(scope).join(sanitize_symbol(symbol))
    }

    pub fn timeframe_dir(&self, scope: Scope, symbol: &str, interval: Interval) -> PathBuf {
        self.symbol_dir(scope, symbol).join(interval.code())
    }

    /// Full path of one month file.
    pub fn month_file(
        &self,
        scope: Scope,
        symbol: &str,
        interval: Interval,
        year: i32,
        month: u32,
        compressed: bool,
    ) -> PathBuf {
        let ext = if compressed { EXT_COMPRESSED } else { EXT_PLAIN };
        self.timeframe_dir(scope, symbol, interval)
            .join(format!("{year:04}"))
            .join(format!("{month:02}{ext}"))
    }

    /// All month files for (symbol, interval), chronologically sorted.
    /// Both compression flavors are reported when both exist.
    pub async fn list_month_files(
        &self,
        scope: Scope,
        symbol: &str,
        interval: Interval,
    ) -> Result<Vec<MonthFile>> {
        self.month_files_in_range(scope, symbol, interval, None, None, false)
            .await
    }

    /// Month files whose (year, month) intersects `[start, end]`,
    /// chronologically sorted. With `prefer_compressed`, only one file per
    /// month is returned and `.bin.gz` wins over `.bin`.
    pub async fn month_files_in_range(
        &self,
        scope: Scope,
        symbol: &str,
        interval: Interval,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        prefer_compressed: bool,
    ) -> Result<Vec<MonthFile>> {
        let tf_dir = self.timeframe_dir(scope, symbol, interval);
        let mut files = Vec::new();

        let start_ym = start.map(|t| (t.year(), t.month()));
        let end_ym = end.map(|t| (t.year(), t.month()));

        for (year, year_dir) in read_dir_sorted(&tf_dir, parse_year).await? {
            if start_ym.is_some_and(|(y, _)| year < y) || end_ym.is_some_and(|(y, _)| year > y) {
                continue;
            }
            let min_month = match start_ym {
                Some((y, m)) if y == year => m,
                _ => 1,
            };
            let max_month = match end_ym {
                Some((y, m)) if y == year => m,
                _ => 12,
            };

            let mut months = read_dir_sorted(&year_dir, parse_month_file).await?;
            months.retain(|((month, _), _)| *month >= min_month && *month <= max_month);

            let mut last_month: Option<u32> = None;
            for ((month, compressed), path) in months {
                if prefer_compressed {
                    if last_month == Some(month) {
                        // Plain flavor sorts first; replace it with the
                        // compressed one.
                        files.pop();
                    }
                    last_month = Some(month);
                }
                files.push(MonthFile {
                    path,
                    year,
                    month,
                    compressed,
                });
            }
        }
        Ok(files)
    }

    /// Top-level child directories of the scope's base: the symbol set.
    pub async fn list_symbols(&self, scope: Scope) -> Result<Vec<String>> {
        let base = self.base_dir(scope);
        Ok(
            read_dir_sorted(&base, |name, is_dir| is_dir.then(|| name.to_string()))
                .await?
                .into_iter()
                .map(|(name, _)| name)
                .collect(),
        )
    }

    /// Child directories of a symbol that parse as interval short codes.
    /// Unknown directory names are ignored.
    pub async fn list_intervals(&self, scope: Scope, symbol: &str) -> Result<Vec<Interval>> {
        let dir = self.symbol_dir(scope, symbol);
        let mut intervals: Vec<Interval> =
            read_dir_sorted(&dir, |name, is_dir| {
                is_dir.then(|| name.to_string()).filter(|n| {
                    Interval::from_code(n).is_some()
                })
            })
            .await?
            .into_iter()
            .filter_map(|(name, _)| Interval::from_code(&name))
            .collect();
        intervals.sort_by_key(|i| i.try_seconds());
        Ok(intervals)
    }
}

fn parse_year(name: &str, is_dir: bool) -> Option<i32> {
    if !is_dir || name.len() != 4 {
        return None;
    }
    name.parse().ok()
}

/// Parse `MM.bin` / `MM.bin.gz` into `(month, compressed)`.
fn parse_month_file(name: &str, is_dir: bool) -> Option<(u32, bool)> {
    if is_dir {
        return None;
    }
    let (stem, compressed) = if let Some(stem) = name.strip_suffix(EXT_COMPRESSED) {
        (stem, true)
    } else if let Some(stem) = name.strip_suffix(EXT_PLAIN) {
        (stem, false)
    } else {
        return None;
    };
    if stem.len() != 2 {
        return None;
    }
    let month: u32 = stem.parse().ok()?;
    (1..=12).contains(&month).then_some((month, compressed))
}

/// Read a directory, map entries through `parse`, and return the survivors
/// sorted by key. A missing directory yields an empty list.
async fn read_dir_sorted<K, F>(dir: &Path, parse: F) -> Result<Vec<(K, PathBuf)>>
where
    K: Ord,
    F: Fn(&str, bool) -> Option<K>,
{
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let is_dir = entry.file_type().await?.is_dir();
        if let Some(key) = parse(&name, is_dir) {
            out.push((key, entry.path()));
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}
