#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use history_vault::{Candle, HistoryVault, Interval, VaultOptions};

/// Vault rooted inside a temp directory; both scopes resolve to it.
pub fn vault_at(tmp: &TempDir) -> HistoryVault {
    HistoryVault::new(VaultOptions {
        base_path_override: Some(tmp.path().to_path_buf()),
        ..VaultOptions::default()
    })
}

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

/// Aligned candle series with deterministic, index-derived prices.
pub fn series(start: DateTime<Utc>, interval: Interval, count: usize) -> Vec<Candle> {
    let step = interval.duration().unwrap();
    (0..count)
        .map(|i| {
            let open = dec!(100) + Decimal::from(i as i64 % 17);
            Candle::aligned(
                start + step * i as i32,
                interval,
                open,
                open + dec!(2.5),
                open - dec!(1.25),
                open + dec!(0.75),
                dec!(10) + Decimal::from(i as i64),
            )
            .unwrap()
        })
        .collect()
}

/// Candles covering every `interval` slot of one calendar month.
pub fn full_month(year: i32, month: u32, interval: Interval) -> Vec<Candle> {
    let start = Utc
        .with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .unwrap();
    let (next_y, next_m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = Utc.with_ymd_and_hms(next_y, next_m, 1, 0, 0, 0).unwrap();
    let count = ((end - start).num_seconds() / interval.seconds().unwrap()) as usize;
    series(start, interval, count)
}
