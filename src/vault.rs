//! Vault engine: save/load/merge/delete orchestration.
//!
//! ## Write path
//!
//! Saves serialize per symbol behind a binary semaphore, derive target
//! timeframes through the aggregator, group candles by calendar month,
//! optionally merge with what is already on disk, and replace each month
//! file atomically (same-directory temp file + rename). The alternative
//! compression flavor of a month is deleted after the new file lands, so a
//! crash in between leaves two readable files and the reader's
//! prefer-compressed rule keeps behavior deterministic.
//!
//! ## Read path
//!
//! Loads expand the symbol pattern against the cached symbol index and fan
//! out across matching symbols with a bounded concurrency. Reads take no
//! locks; they observe whole pre- or post-rename files only.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::aggregate;
use crate::availability::{self, AvailabilityReport};
use crate::candle::{Candle, SymbolData, TimeframeData};
use crate::codec;
use crate::compression;
use crate::error::{Result, VaultError};
use crate::interval::Interval;
use crate::options::{LoadOptions, SaveOptions, VaultOptions};
use crate::paths::{PathResolver, Scope};
use crate::range::DateRange;
use crate::symbol_index::SymbolIndex;
use crate::ticks::{self, TICKS_PER_SECOND};

/// Month-partitioned candle store over a base directory.
///
/// Cheap to share behind an `Arc`; all operations take `&self`.
pub struct HistoryVault {
    options: VaultOptions,
    resolver: Arc<PathResolver>,
    symbols: SymbolIndex,
    write_locks: DashMap<String, Arc<Semaphore>>,
}

impl HistoryVault {
    pub fn new(options: VaultOptions) -> Self {
        let resolver = Arc::new(PathResolver::new(options.base_path_override.clone()));
        Self {
            symbols: SymbolIndex::new(Arc::clone(&resolver)),
            resolver,
            write_locks: DashMap::new(),
            options,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(VaultOptions::default())
    }

    /// Persist a symbol's timeframe bundles.
    ///
    /// Serializes against concurrent saves of the same symbol; saves of
    /// different symbols run independently. On success the symbol becomes
    /// visible to pattern queries immediately.
    pub async fn save(&self, data: &SymbolData, options: &SaveOptions) -> Result<()> {
        if data.symbol.trim().is_empty() {
            return Err(VaultError::InvalidArgument("symbol must be non-empty".into()));
        }
        check_cancel(&options.cancel)?;

        let scope = options.scope.unwrap_or(self.options.default_scope);
        let lock = self.write_lock(&data.symbol);
        let _permit = lock
            .acquire_owned()
            .await
            .expect("per-symbol write semaphore never closes");

        // Concatenate bundles sharing a source interval before deriving
        // targets. Aggregating each bundle separately would emit one
        // trailing partial candle per bundle for a period split across
        // them; the merged, sorted sequence aggregates each period once.
        let mut sources: Vec<(Interval, Vec<Candle>)> = Vec::new();
        for bundle in &data.timeframes {
            push_target(&mut sources, bundle.interval, bundle.candles.clone());
        }

        let mut per_target: Vec<(Interval, Vec<Candle>)> = Vec::new();
        for (source, mut candles) in sources {
            check_cancel(&options.cancel)?;
            candles.sort_by_key(|c| c.open_time);
            let targets = self.derive_targets(source, options);

            let pass_through = targets.contains(&source);
            let derived: Vec<Interval> =
                targets.into_iter().filter(|t| *t != source).collect();

            for (target, rolled) in
                aggregate::aggregate_to_multiple(&candles, source, &derived)?
            {
                push_target(&mut per_target, target, rolled);
            }
            if pass_through {
                push_target(&mut per_target, source, candles);
            }
        }

        for (interval, candles) in per_target {
            self.save_timeframe(scope, &data.symbol, interval, candles, options)
                .await?;
        }

        self.symbols.add_to_cache(&data.symbol, scope);
        debug!(symbol = %data.symbol, ?scope, "save complete");
        Ok(())
    }

    /// Load the first symbol matching the options' pattern.
    pub async fn load(&self, options: &LoadOptions) -> Result<Option<SymbolData>> {
        Ok(self.load_multiple(options).await?.into_iter().next())
    }

    /// Load every symbol matching the options' pattern, fanning out with
    /// bounded parallelism. Results are sorted by symbol.
    pub async fn load_multiple(&self, options: &LoadOptions) -> Result<Vec<SymbolData>> {
        check_cancel(&options.cancel)?;
        let scope = options.scope.unwrap_or(self.options.default_scope);
        let symbols = self.symbols.matching(&options.symbol, scope).await?;
        trace!(pattern = %options.symbol, matched = symbols.len(), "expanding load pattern");

        let loaded: Vec<Option<SymbolData>> = stream::iter(
            symbols
                .into_iter()
                .map(|symbol| async move { self.load_symbol_data(&symbol, scope, options).await }),
        )
        .buffer_unordered(self.options.max_parallelism.max(1))
        .try_collect()
        .await?;

        let mut out: Vec<SymbolData> = loaded.into_iter().flatten().collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(out)
    }

    /// Header-scan report of covered and missing sub-ranges.
    pub async fn check_availability(
        &self,
        symbol: &str,
        interval: Interval,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        scope: Option<Scope>,
    ) -> Result<AvailabilityReport> {
        let scope = scope.unwrap_or(self.options.default_scope);
        availability::check_availability(&self.resolver, scope, symbol, interval, start, end).await
    }

    /// Earliest and latest stored instants for (symbol, interval).
    pub async fn data_bounds(
        &self,
        symbol: &str,
        interval: Interval,
        scope: Option<Scope>,
    ) -> Result<Option<DateRange>> {
        let scope = scope.unwrap_or(self.options.default_scope);
        availability::data_bounds(&self.resolver, scope, symbol, interval).await
    }

    /// Whether any candle exists for (symbol, interval).
    pub async fn has_data(
        &self,
        symbol: &str,
        interval: Interval,
        scope: Option<Scope>,
    ) -> Result<bool> {
        Ok(self.data_bounds(symbol, interval, scope).await?.is_some())
    }

    /// Symbols matching a glob pattern.
    pub async fn matching_symbols(
        &self,
        pattern: &str,
        scope: Option<Scope>,
    ) -> Result<Vec<String>> {
        let scope = scope.unwrap_or(self.options.default_scope);
        self.symbols.matching(pattern, scope).await
    }

    /// Timeframes stored for a symbol.
    pub async fn available_timeframes(
        &self,
        symbol: &str,
        scope: Option<Scope>,
    ) -> Result<Vec<Interval>> {
        let scope = scope.unwrap_or(self.options.default_scope);
        self.symbols.available_timeframes(symbol, scope).await
    }

    /// Remove a symbol's entire directory. Returns whether anything existed.
    pub async fn delete_symbol(&self, symbol: &str, scope: Option<Scope>) -> Result<bool> {
        let scope = scope.unwrap_or(self.options.default_scope);
        let removed = remove_dir_if_exists(&self.resolver.symbol_dir(scope, symbol)).await?;
        self.symbols.invalidate(scope);
        debug!(symbol, ?scope, removed, "delete symbol");
        Ok(removed)
    }

    /// Remove one timeframe directory of a symbol.
    pub async fn delete_timeframe(
        &self,
        symbol: &str,
        interval: Interval,
        scope: Option<Scope>,
    ) -> Result<bool> {
        let scope = scope.unwrap_or(self.options.default_scope);
        let dir = self.resolver.timeframe_dir(scope, symbol, interval);
        let removed = remove_dir_if_exists(&dir).await?;
        self.symbols.invalidate(scope);
        debug!(symbol, %interval, ?scope, removed, "delete timeframe");
        Ok(removed)
    }

    // === Save internals ===

    /// Target timeframes for one input bundle.
    fn derive_targets(&self, source: Interval, options: &SaveOptions) -> Vec<Interval> {
        let mut targets = match (&options.target_timeframes, options.aggregate_from_smallest) {
            (Some(list), false) => list.clone(),
            (Some(list), true) => {
                let mut out = vec![source];
                out.extend(list.iter().copied().filter(|t| source.can_aggregate(*t)));
                out
            }
            (None, _) => match &self.options.default_timeframes {
                Some(defaults) => defaults.clone(),
                None => vec![source],
            },
        };
        let mut seen = Vec::with_capacity(targets.len());
        targets.retain(|t| {
            let fresh = !seen.contains(t);
            seen.push(*t);
            fresh
        });
        targets
    }

    async fn save_timeframe(
        &self,
        scope: Scope,
        symbol: &str,
        interval: Interval,
        candles: Vec<Candle>,
        options: &SaveOptions,
    ) -> Result<()> {
        let batch = options.batch_size.max(1);
        let mut months: BTreeMap<(i32, u32), Vec<Candle>> = BTreeMap::new();
        for (idx, candle) in candles.into_iter().enumerate() {
            if idx % batch == 0 {
                check_cancel(&options.cancel)?;
            }
            months
                .entry(ticks::year_month(candle.open_time))
                .or_default()
                .push(candle);
        }

        for ((year, month), mut group) in months {
            check_cancel(&options.cancel)?;
            group.sort_by_key(|c| c.open_time);
            self.write_month(scope, symbol, interval, year, month, group, options)
                .await?;
        }
        Ok(())
    }

    async fn write_month(
        &self,
        scope: Scope,
        symbol: &str,
        interval: Interval,
        year: i32,
        month: u32,
        incoming: Vec<Candle>,
        options: &SaveOptions,
    ) -> Result<()> {
        let candles = if options.allow_partial_overwrite {
            match self.read_month(scope, symbol, interval, year, month).await? {
                Some(existing) => merge_candles(existing, incoming),
                None => incoming,
            }
        } else {
            incoming
        };

        let target = self.resolver.month_file(
            scope,
            symbol,
            interval,
            year,
            month,
            options.use_compression,
        );
        let alternative = self.resolver.month_file(
            scope,
            symbol,
            interval,
            year,
            month,
            !options.use_compression,
        );

        if self.options.auto_create_directories {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let encoded = codec::encode(&candles, interval, options.use_compression);
        let compressed;
        let payload: &[u8] = if options.use_compression {
            compressed = compression::compress(&encoded, options.compression_level).await?;
            &compressed
        } else {
            &encoded
        };

        // Atomic replace: a temp file in the same directory renames over
        // the target, so readers only ever observe a whole file.
        let staging = staging_path(&target);
        tokio::fs::write(&staging, payload).await?;
        tokio::fs::rename(&staging, &target).await?;
        remove_file_if_exists(&alternative).await?;

        trace!(
            symbol,
            %interval,
            year,
            month,
            candles = candles.len(),
            bytes = payload.len(),
            "wrote month file"
        );
        Ok(())
    }

    /// Existing candles for one month, preferring the compressed flavor.
    async fn read_month(
        &self,
        scope: Scope,
        symbol: &str,
        interval: Interval,
        year: i32,
        month: u32,
    ) -> Result<Option<Vec<Candle>>> {
        for compressed in [true, false] {
            let path = self
                .resolver
                .month_file(scope, symbol, interval, year, month, compressed);
            match tokio::fs::read(&path).await {
                Ok(bytes) => return Ok(Some(self.decode_file(bytes).await?)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(None)
    }

    /// Decode a raw month file, sniffing for gzip rather than trusting the
    /// extension.
    async fn decode_file(&self, bytes: Vec<u8>) -> Result<Vec<Candle>> {
        if compression::is_compressed(&bytes) {
            let estimate = self.options.buffer_size.max(bytes.len() * 4);
            let unpacked = compression::decompress_pooled(&bytes, estimate).await?;
            Ok(codec::decode(&unpacked)?.0)
        } else {
            Ok(codec::decode(&bytes)?.0)
        }
    }

    // === Load internals ===

    async fn load_symbol_data(
        &self,
        symbol: &str,
        scope: Scope,
        options: &LoadOptions,
    ) -> Result<Option<SymbolData>> {
        let requested = match &options.timeframes {
            Some(list) if !list.is_empty() => list.clone(),
            _ => self.symbols.available_timeframes(symbol, scope).await?,
        };

        let mut bundles = Vec::new();
        for interval in requested {
            check_cancel(&options.cancel)?;
            let mut candles = self
                .load_timeframe_data(symbol, scope, interval, options, options.warmup_count)
                .await?;
            if candles.is_empty() && options.allow_aggregation {
                candles = self
                    .try_aggregate_timeframe(symbol, scope, interval, options)
                    .await?;
            }
            if !candles.is_empty() {
                bundles.push(TimeframeData::new(interval, candles));
            }
        }

        if bundles.is_empty() {
            return Ok(None);
        }
        Ok(Some(SymbolData {
            symbol: symbol.to_string(),
            timeframes: bundles,
        }))
    }

    async fn load_timeframe_data(
        &self,
        symbol: &str,
        scope: Scope,
        interval: Interval,
        options: &LoadOptions,
        warmup_count: usize,
    ) -> Result<Vec<Candle>> {
        let effective_start = match (options.start, interval.try_seconds()) {
            (Some(start), Some(secs)) if warmup_count > 0 => {
                Some(start - chrono::Duration::seconds(secs * warmup_count as i64))
            }
            (start, _) => start,
        };
        // An explicit end date reaches to the end of its calendar day, so
        // "end: 2025-06-03" includes all of June 3rd.
        let effective_end = options.end.map(ticks::end_of_day);

        let files = self
            .resolver
            .month_files_in_range(scope, symbol, interval, effective_start, effective_end, true)
            .await?;

        let mut candles = Vec::new();
        for file in files {
            check_cancel(&options.cancel)?;
            let bytes = tokio::fs::read(&file.path).await?;
            candles.extend(self.decode_file(bytes).await?);
        }

        candles.retain(|c| {
            effective_start.map_or(true, |s| c.open_time >= s)
                && effective_end.map_or(true, |e| c.open_time <= e)
        });
        candles.sort_by_key(|c| c.open_time);
        Ok(candles)
    }

    /// Derive a missing timeframe from the smallest stored one that divides
    /// it, scaling warmup by the aggregation factor.
    async fn try_aggregate_timeframe(
        &self,
        symbol: &str,
        scope: Scope,
        target: Interval,
        options: &LoadOptions,
    ) -> Result<Vec<Candle>> {
        let available = self.symbols.available_timeframes(symbol, scope).await?;
        let Some(source) = available.into_iter().find(|s| s.can_aggregate(target)) else {
            return Ok(Vec::new());
        };

        let factor = source.factor(target)? as usize;
        let raw = self
            .load_timeframe_data(symbol, scope, source, options, options.warmup_count * factor)
            .await?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }

        trace!(symbol, %source, %target, candles = raw.len(), "aggregating on load");
        let mut rolled = aggregate::aggregate(&raw, source, target)?;

        if !options.include_partial_candles {
            if let Some(last) = rolled.last() {
                let span =
                    ticks::to_ticks(last.close_time) - ticks::to_ticks(last.open_time) + 1;
                let full = target.seconds()? * TICKS_PER_SECOND;
                // Jitter tolerance matches the aggregator's close-time rule.
                if span + TICKS_PER_SECOND < full {
                    rolled.pop();
                }
            }
        }
        Ok(rolled)
    }

    fn write_lock(&self, symbol: &str) -> Arc<Semaphore> {
        self.write_locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }
}

fn push_target(per_target: &mut Vec<(Interval, Vec<Candle>)>, interval: Interval, candles: Vec<Candle>) {
    match per_target.iter_mut().find(|(i, _)| *i == interval) {
        Some((_, acc)) => acc.extend(candles),
        None => per_target.push((interval, candles)),
    }
}

/// Linear merge of two sorted-by-`open_time` sequences. On equal open
/// times the incoming candle wins; everything else passes through.
fn merge_candles(existing: Vec<Candle>, incoming: Vec<Candle>) -> Vec<Candle> {
    let mut out = Vec::with_capacity(existing.len() + incoming.len());
    let mut old = existing.into_iter().peekable();
    let mut new = incoming.into_iter().peekable();

    loop {
        let take_existing = match (old.peek(), new.peek()) {
            (Some(a), Some(b)) => {
                if a.open_time == b.open_time {
                    old.next(); // superseded by the incoming candle
                    false
                } else {
                    a.open_time < b.open_time
                }
            }
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_existing { old.next() } else { new.next() };
        if let Some(candle) = next {
            out.push(candle);
        }
    }
    out
}

fn check_cancel(cancel: &Option<CancellationToken>) -> Result<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(VaultError::Cancelled),
        _ => Ok(()),
    }
}

fn staging_path(target: &std::path::Path) -> std::path::PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{name}.tmp"))
}

async fn remove_file_if_exists(path: &std::path::Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

async fn remove_dir_if_exists(path: &std::path::Path) -> Result<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
