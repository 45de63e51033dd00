//! Crate-wide error type.

use thiserror::Error;

use crate::interval::Interval;

/// The unified error type for the `history_vault` crate.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Caller-supplied input was rejected before any work started.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The first four bytes of a vault file did not spell `HVLT`.
    #[error("bad magic bytes in file header")]
    BadMagic,

    /// The header declared a format version newer than this build understands.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),

    /// Input ended before the declared record payload.
    #[error("truncated input: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// The header declared a negative record count.
    #[error("negative record count {0}")]
    NegativeCount(i64),

    /// Any I/O failure from the host filesystem.
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    /// Cooperative cancellation was observed at a checkpoint.
    #[error("operation cancelled")]
    Cancelled,

    /// The finer interval cannot be rolled up into the coarser one.
    #[error("cannot aggregate {from} into {to}")]
    AggregationIncompatible { from: Interval, to: Interval },
}

pub type Result<T> = std::result::Result<T, VaultError>;
