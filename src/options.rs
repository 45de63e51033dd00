//! Engine, save, and load option structs.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::compression::CompressionLevel;
use crate::interval::Interval;
use crate::paths::Scope;

/// Default decode/decompress working-buffer size: 80 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 80 * 1024;

/// Engine-level configuration.
#[derive(Clone, Debug)]
pub struct VaultOptions {
    /// Scope used when an operation does not name one.
    pub default_scope: Scope,
    /// Overrides both scope base directories when set. Tests always set it.
    pub base_path_override: Option<PathBuf>,
    /// Bound on the multi-symbol read fanout.
    pub max_parallelism: usize,
    /// Size estimate handed to the pooled decompressor.
    pub buffer_size: usize,
    /// Create missing directories on save.
    pub auto_create_directories: bool,
    /// Target timeframes applied when a save names none.
    pub default_timeframes: Option<Vec<Interval>>,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            default_scope: Scope::Local,
            base_path_override: None,
            max_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            buffer_size: DEFAULT_BUFFER_SIZE,
            auto_create_directories: true,
            default_timeframes: None,
        }
    }
}

/// Per-save configuration.
#[derive(Clone, Debug)]
pub struct SaveOptions {
    /// Write `.bin.gz` month files instead of `.bin`.
    pub use_compression: bool,
    pub compression_level: CompressionLevel,
    /// Merge incoming candles with existing month files instead of
    /// replacing them wholesale.
    pub allow_partial_overwrite: bool,
    /// Scope override for this save.
    pub scope: Option<Scope>,
    /// Explicit target timeframes; see `aggregate_from_smallest`.
    pub target_timeframes: Option<Vec<Interval>>,
    /// Keep the source timeframe and add every compatible target from
    /// `target_timeframes`, instead of taking the list verbatim.
    pub aggregate_from_smallest: bool,
    /// Advisory grouping hint; the writer may flush in batches of this size.
    pub batch_size: usize,
    /// Checked at every file and candle-group boundary.
    pub cancel: Option<CancellationToken>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            use_compression: true,
            compression_level: CompressionLevel::default(),
            allow_partial_overwrite: false,
            scope: None,
            target_timeframes: None,
            aggregate_from_smallest: false,
            batch_size: 5_000,
            cancel: None,
        }
    }
}

/// Per-load configuration.
#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Symbol name or glob pattern.
    pub symbol: String,
    /// Inclusive range start; unbounded when `None`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive range end, extended to the end of its calendar day;
    /// unbounded when `None`.
    pub end: Option<DateTime<Utc>>,
    /// Timeframes to load; everything on disk when `None` or empty.
    pub timeframes: Option<Vec<Interval>>,
    /// Extra candles loaded before `start` for indicator warmup. Scaled by
    /// the aggregation factor when a timeframe is aggregated on the fly.
    pub warmup_count: usize,
    /// Scope override for this load.
    pub scope: Option<Scope>,
    /// Derive a missing timeframe from the smallest compatible stored one.
    pub allow_aggregation: bool,
    /// Keep a trailing aggregated candle built from an incomplete period.
    pub include_partial_candles: bool,
    /// Checked at every file boundary.
    pub cancel: Option<CancellationToken>,
}

impl LoadOptions {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            symbol: "*".to_string(),
            start: None,
            end: None,
            timeframes: None,
            warmup_count: 0,
            scope: None,
            allow_aggregation: false,
            include_partial_candles: true,
            cancel: None,
        }
    }
}
