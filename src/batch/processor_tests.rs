//! Snapshot Batch Processor Tests
//!
//! - One record per snapshot with provenance
//! - Malformed and missing-quote rows degrade to undefined, batch continues
//! - Reproducible row ids across repeated runs
//! - Mean curve aggregation skips undefined observations

use crate::batch::*;
use crate::book::{BookSnapshot, Ladder, Side};
use std::sync::Arc;

fn source() -> Arc<SnapshotSource> {
    Arc::new(SnapshotSource::new("AAPL", "AAPL_20240102.csv", "20240102"))
}

fn book(ask: f64, ask_size: f64) -> BookSnapshot {
    BookSnapshot::from_ladders(
        Ladder::from_pairs(&[(ask, ask_size), (ask + 1.0, ask_size)]),
        Ladder::from_pairs(&[(ask - 2.0, ask_size)]),
    )
}

fn sample_rows() -> Vec<SnapshotInput> {
    let src = source();
    vec![
        SnapshotInput::new(src.clone(), book(101.0, 500.0)),
        SnapshotInput::malformed(
            src.clone(),
            MalformedRow {
                line: Some(3),
                reason: "unterminated quote".to_string(),
            },
        ),
        SnapshotInput::new(
            src.clone(),
            BookSnapshot::new(None, Some(101.0), Ladder::from_pairs(&[(101.0, 500.0)]), Ladder::default()),
        ),
        SnapshotInput::new(src, book(102.0, 100.0)),
    ]
}

// =============================================================================
// RECORD SHAPE
// =============================================================================

#[test]
fn test_one_record_per_snapshot_with_provenance() {
    let processor = SnapshotBatchProcessor::new(Side::Buy, vec![100.0, 500.0, 1_000.0]);
    let out = processor.process(&sample_rows(), 10);

    assert_eq!(out.records.len(), 4);
    assert_eq!(out.next_row_id, 14);
    let ids: Vec<u64> = out.records.iter().map(|r| r.row_id).collect();
    assert_eq!(ids, vec![10, 11, 12, 13]);

    for record in &out.records {
        assert_eq!(record.instrument, "AAPL");
        assert_eq!(record.source_file, "AAPL_20240102.csv");
        assert_eq!(record.date, "20240102");
        assert_eq!(record.slippage.len(), 3);
    }
}

#[test]
fn test_slippage_values_per_size() {
    let processor = SnapshotBatchProcessor::new(Side::Buy, vec![100.0, 500.0, 1_000.0]);
    let out = processor.process(&sample_rows(), 0);

    // Row 0: bid 99, ask 101 (500) then 102 (500). Mid 100.
    let row = &out.records[0].slippage;
    assert_eq!(row[0], Some(1.0));
    assert_eq!(row[1], Some(1.0));
    assert!((row[2].unwrap() - 1.5).abs() < 1e-12);

    // Row 3: ladder holds 200 in total, only the first size fills.
    let row = &out.records[3].slippage;
    assert!(row[0].is_some());
    assert_eq!(row[1], None);
    assert_eq!(row[2], None);
}

#[test]
fn test_bad_rows_are_fully_undefined_and_batch_continues() {
    let processor = SnapshotBatchProcessor::new(Side::Buy, vec![100.0, 200.0]);
    let out = processor.process(&sample_rows(), 0);

    assert!(out.records[1].slippage.iter().all(Option::is_none));
    assert!(out.records[2].slippage.iter().all(Option::is_none));
    assert!(out.records[3].slippage.iter().all(Option::is_some));

    assert_eq!(out.stats.rows, 4);
    assert_eq!(out.stats.malformed_rows, 1);
    assert_eq!(out.stats.missing_quote_rows, 1);
    assert_eq!(out.stats.undefined_cells, 4);
}

#[test]
fn test_processing_is_idempotent() {
    let processor = SnapshotBatchProcessor::new(Side::Buy, (1..=20).map(|i| i as f64 * 100.0).collect());
    let rows = sample_rows();
    let first = processor.process(&rows, 42);
    let second = processor.process(&rows, 42);
    assert_eq!(first, second);
}

#[test]
fn test_sell_side_uses_bid_ladder() {
    let processor = SnapshotBatchProcessor::new(Side::Sell, vec![100.0]);
    let out = processor.process(&sample_rows()[..1], 0);
    // Best bid 99, mid 100: selling 100 at 99 is 1.0 of slippage.
    assert_eq!(out.records[0].slippage[0], Some(1.0));
}

#[test]
fn test_empty_batch() {
    let processor = SnapshotBatchProcessor::new(Side::Buy, vec![100.0]);
    let out = processor.process(&[], 7);
    assert!(out.records.is_empty());
    assert_eq!(out.next_row_id, 7);
    assert_eq!(out.stats, BatchStats::default());
}

// =============================================================================
// SERIES AND MEAN CURVE
// =============================================================================

#[test]
fn test_mean_curve_skips_undefined() {
    let processor = SnapshotBatchProcessor::new(Side::Buy, vec![100.0, 500.0, 5_000.0]);
    let out = processor.process(&sample_rows(), 0);
    let series = InstrumentSlippageSeries::new("AAPL", processor.sizes().to_vec(), out.records);

    assert_eq!(series.defined_counts(), vec![2, 1, 0]);

    let curve = series.mean_curve();
    assert_eq!(curve.instrument, "AAPL");
    assert_eq!(curve.xs(), vec![100.0, 500.0]);
    assert_eq!(curve.undefined_sizes, vec![5_000.0]);
    assert_eq!(curve.points[0].observations, 2);

    // Row 0 gives 1.0 at size 100; row 3 gives 102 - 101 = 1.0.
    assert!((curve.points[0].mean_slippage - 1.0).abs() < 1e-12);
}

#[test]
fn test_series_lookup_by_row_and_size() {
    let processor = SnapshotBatchProcessor::new(Side::Buy, vec![100.0, 500.0]);
    let out = processor.process(&sample_rows(), 100);
    let series = InstrumentSlippageSeries::new("AAPL", processor.sizes().to_vec(), out.records);

    assert_eq!(series.get(100, 500.0), Some(1.0));
    assert_eq!(series.get(101, 500.0), None);
    assert_eq!(series.get(100, 750.0), None);
    assert_eq!(series.get(999, 100.0), None);
}

#[test]
fn test_curve_from_pairs_is_sorted() {
    let curve = MeanSlippageCurve::from_pairs("X", &[(300.0, 2.0), (100.0, 1.0), (200.0, 1.5)]);
    assert_eq!(curve.xs(), vec![100.0, 200.0, 300.0]);
    assert_eq!(curve.ys(), vec![1.0, 1.5, 2.0]);
    assert_eq!(curve.distinct_sizes(), 3);
}
