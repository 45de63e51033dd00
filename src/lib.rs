//! History Vault
//!
//! An embedded, month-partitioned filesystem store for OHLCV candle
//! history. Callers persist batches of candles per symbol and timeframe,
//! then query arbitrary date ranges across many symbols at once, optionally
//! aggregating fine-grained bars into coarser ones on the fly.
//!
//! ## Architecture
//!
//! - `interval`: the candle interval catalog and aggregation rules
//! - `range`: closed date-range primitive with tick-tolerant adjacency
//! - `candle`: caller-facing value types
//! - `codec`: the `HVLT` binary file format and buffer pool
//! - `compression`: gzip adapter with magic-byte sniffing
//! - `paths`: directory layout and enumeration
//! - `aggregate`: streaming OHLCV reduction
//! - `availability`: header-only coverage and gap scanning
//! - `symbol_index`: cached symbol directory with glob matching
//! - `vault`: the engine tying it all together
//!
//! ## Usage
//!
//! ```ignore
//! let vault = HistoryVault::new(VaultOptions::default());
//! vault.save(&data, &SaveOptions::default()).await?;
//! let loaded = vault.load(&LoadOptions::new("BTC.*")).await?;
//! ```

pub mod aggregate;
pub mod availability;
pub mod candle;
pub mod codec;
pub mod compression;
pub mod error;
pub mod interval;
pub mod options;
pub mod paths;
pub mod range;
pub mod symbol_index;
pub mod ticks;
pub mod vault;

// Re-export main types
pub use availability::AvailabilityReport;
pub use candle::{Candle, SymbolData, TimeframeData};
pub use compression::CompressionLevel;
pub use error::{Result, VaultError};
pub use interval::Interval;
pub use options::{LoadOptions, SaveOptions, VaultOptions};
pub use paths::Scope;
pub use range::DateRange;
pub use vault::HistoryVault;

// Re-export codec surface for tooling that reads vault files directly
pub use codec::{Header, FLAG_COMPRESSED, HEADER_SIZE, MAGIC, RECORD_SIZE, VERSION};
