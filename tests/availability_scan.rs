//! Header-scan availability reports against real month files.

mod common;

use anyhow::Result;

use common::{at, full_month, series, vault_at};
use history_vault::{
    ticks, Interval, SaveOptions, SymbolData,
};

#[tokio::test]
async fn month_boundary_merges_into_one_range() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let vault = vault_at(&tmp);

    // June and July 2025 saved separately, compressed (the scan must
    // decompress to reach the headers).
    for month in [6, 7] {
        vault
            .save(
                &SymbolData::new("S2")
                    .with_timeframe(Interval::H1, full_month(2025, month, Interval::H1)),
                &SaveOptions::default(),
            )
            .await?;
    }

    let report = vault
        .check_availability(
            "S2",
            Interval::H1,
            at(2025, 6, 1, 0, 0, 0),
            at(2025, 7, 31, 23, 59, 59),
            None,
        )
        .await?;

    assert_eq!(report.available_ranges.len(), 1);
    assert!(report.missing_ranges.is_empty());
    assert_eq!(report.expected_count, 1464);
    assert!(report.is_complete());
    assert!((report.coverage - 1.0).abs() < 1e-9);
    Ok(())
}

#[tokio::test]
async fn whole_missing_month_is_reported() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let vault = vault_at(&tmp);

    for month in [1, 3] {
        vault
            .save(
                &SymbolData::new("S3")
                    .with_timeframe(Interval::H1, full_month(2025, month, Interval::H1)),
                &SaveOptions::default(),
            )
            .await?;
    }

    let report = vault
        .check_availability(
            "S3",
            Interval::H1,
            at(2025, 1, 1, 0, 0, 0),
            at(2025, 3, 31, 23, 59, 59),
            None,
        )
        .await?;

    assert_eq!(report.available_ranges.len(), 2);
    assert_eq!(report.missing_ranges.len(), 1);

    // The gap covers all of February, with one tick of tolerance on each
    // bound.
    let gap = report.missing_ranges[0];
    let feb_start = ticks::to_ticks(at(2025, 2, 1, 0, 0, 0));
    let feb_end = ticks::to_ticks(at(2025, 3, 1, 0, 0, 0)) - 1;
    assert!((ticks::to_ticks(gap.start) - feb_start).abs() <= 1);
    assert!((ticks::to_ticks(gap.end) - feb_end).abs() <= 1);

    assert!(report.coverage > 0.6 && report.coverage < 0.7);
    Ok(())
}

#[tokio::test]
async fn coverage_is_zero_without_data_and_clamped_to_one() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let vault = vault_at(&tmp);

    let empty = vault
        .check_availability(
            "GHOST",
            Interval::H1,
            at(2025, 1, 1, 0, 0, 0),
            at(2025, 1, 2, 0, 0, 0),
            None,
        )
        .await?;
    assert_eq!(empty.coverage, 0.0);
    assert_eq!(empty.available_ranges.len(), 0);
    assert_eq!(empty.missing_ranges.len(), 1);
    assert_eq!(empty.estimated_count, 0);
    assert!(!empty.is_complete());

    // Query a narrow slice of a fully covered month: coverage stays <= 1.
    vault
        .save(
            &SymbolData::new("FULL")
                .with_timeframe(Interval::H1, full_month(2025, 1, Interval::H1)),
            &SaveOptions::default(),
        )
        .await?;
    let narrow = vault
        .check_availability(
            "FULL",
            Interval::H1,
            at(2025, 1, 10, 0, 0, 0),
            at(2025, 1, 11, 0, 0, 0),
            None,
        )
        .await?;
    assert!((0.0..=1.0).contains(&narrow.coverage));
    assert!((narrow.coverage - 1.0).abs() < 1e-9);
    assert!(narrow.missing_ranges.is_empty());
    Ok(())
}

#[tokio::test]
async fn estimated_count_pro_rates_to_query() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let vault = vault_at(&tmp);

    vault
        .save(
            &SymbolData::new("EST")
                .with_timeframe(Interval::H1, full_month(2025, 1, Interval::H1)),
            &SaveOptions::default(),
        )
        .await?;

    // Roughly half of January.
    let report = vault
        .check_availability(
            "EST",
            Interval::H1,
            at(2025, 1, 1, 0, 0, 0),
            at(2025, 1, 16, 0, 0, 0),
            None,
        )
        .await?;

    let expected = report.expected_count;
    assert!(expected > 0);
    // Pro-rated estimate lands within a candle or two of the expectation.
    assert!((report.estimated_count - expected).abs() <= 2);
    Ok(())
}

#[tokio::test]
async fn data_bounds_reads_edge_headers_only() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let vault = vault_at(&tmp);

    assert!(vault.data_bounds("B", Interval::H1, None).await?.is_none());
    assert!(!vault.has_data("B", Interval::H1, None).await?);

    let jan = full_month(2025, 1, Interval::H1);
    let mar = full_month(2025, 3, Interval::H1);
    let first_open = jan[0].open_time;
    let last_close = mar.last().unwrap().close_time;

    for candles in [jan, mar] {
        vault
            .save(
                &SymbolData::new("B").with_timeframe(Interval::H1, candles),
                &SaveOptions::default(),
            )
            .await?;
    }

    let bounds = vault
        .data_bounds("B", Interval::H1, None)
        .await?
        .expect("data saved");
    assert_eq!(bounds.start, first_open);
    assert_eq!(bounds.end, last_close);
    assert!(vault.has_data("B", Interval::H1, None).await?);
    Ok(())
}

#[tokio::test]
async fn corrupt_file_is_skipped_not_fatal() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let vault = vault_at(&tmp);

    vault
        .save(
            &SymbolData::new("CRPT")
                .with_timeframe(Interval::H1, full_month(2025, 1, Interval::H1)),
            &SaveOptions {
                use_compression: false,
                ..SaveOptions::default()
            },
        )
        .await?;
    vault
        .save(
            &SymbolData::new("CRPT")
                .with_timeframe(Interval::H1, full_month(2025, 2, Interval::H1)),
            &SaveOptions {
                use_compression: false,
                allow_partial_overwrite: true,
                ..SaveOptions::default()
            },
        )
        .await?;

    // Stomp January's file with garbage; the scan must keep going.
    std::fs::write(tmp.path().join("CRPT/1h/2025/01.bin"), b"not a vault file")?;

    let report = vault
        .check_availability(
            "CRPT",
            Interval::H1,
            at(2025, 1, 1, 0, 0, 0),
            at(2025, 2, 28, 23, 59, 59),
            None,
        )
        .await?;

    assert_eq!(report.available_ranges.len(), 1);
    assert_eq!(report.available_ranges[0].start, at(2025, 2, 1, 0, 0, 0));
    assert!(!report.missing_ranges.is_empty());
    Ok(())
}

#[tokio::test]
async fn day_slice_estimate_is_exact() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let vault = vault_at(&tmp);

    vault
        .save(
            &SymbolData::new("EMPT").with_timeframe(
                Interval::H1,
                series(at(2025, 1, 1, 0, 0, 0), Interval::H1, 24),
            ),
            &SaveOptions::default(),
        )
        .await?;

    let report = vault
        .check_availability(
            "EMPT",
            Interval::H1,
            at(2025, 1, 1, 0, 0, 0),
            at(2025, 1, 1, 23, 59, 59),
            None,
        )
        .await?;
    assert_eq!(report.available_ranges.len(), 1);
    assert_eq!(report.estimated_count, 24);
    Ok(())
}

#[tokio::test]
async fn tick_interval_has_zero_expected_count() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let vault = vault_at(&tmp);

    let report = vault
        .check_availability(
            "ANY",
            Interval::Tick,
            at(2025, 1, 1, 0, 0, 0),
            at(2025, 1, 2, 0, 0, 0),
            None,
        )
        .await?;
    assert_eq!(report.expected_count, 0);
    Ok(())
}
