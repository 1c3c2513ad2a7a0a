//! Raw snapshot CSV reader.
//!
//! Only the configured ladder columns are consumed; everything else in the
//! file is ignored. Cells that are empty, non-numeric or non-finite become
//! `None`. A record the CSV layer cannot frame (wrong field count, bad
//! quoting) is kept in sequence as a malformed row so row ids stay aligned.

use super::StorageError;
use crate::batch::{MalformedRow, SnapshotInput, SnapshotSource};
use crate::book::{BookSnapshot, Ladder, LadderLevel};
use crate::config::LadderColumns;
use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Column positions of the configured ladder keys in one file's header.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotColumns {
    best_bid: usize,
    best_ask: usize,
    asks: Vec<(usize, usize)>,
    bids: Vec<(usize, usize)>,
}

impl SnapshotColumns {
    pub fn resolve(headers: &StringRecord, ladder: &LadderColumns, path: &Path) -> Result<Self, StorageError> {
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim(), i))
            .collect();
        let find = |column: &str| {
            index
                .get(column)
                .copied()
                .ok_or_else(|| StorageError::MissingColumn {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                })
        };
        let levels = |cols: &[crate::config::LevelColumns]| {
            cols.iter()
                .map(|lvl| Ok((find(&lvl.price)?, find(&lvl.size)?)))
                .collect::<Result<Vec<_>, StorageError>>()
        };

        Ok(Self {
            best_bid: find(&ladder.best_bid)?,
            best_ask: find(&ladder.best_ask)?,
            asks: levels(&ladder.asks)?,
            bids: levels(&ladder.bids)?,
        })
    }

    /// Build a snapshot from one record. Never fails: bad cells are `None`.
    pub fn parse(&self, record: &StringRecord) -> BookSnapshot {
        let cell = |i: usize| parse_cell(record.get(i));
        let ladder = |cols: &[(usize, usize)]| {
            Ladder::from_levels(
                cols.iter()
                    .map(|&(p, s)| LadderLevel {
                        price: cell(p),
                        size: cell(s),
                    })
                    .collect(),
            )
        };

        BookSnapshot::new(
            cell(self.best_bid),
            cell(self.best_ask),
            ladder(&self.asks),
            ladder(&self.bids),
        )
    }
}

/// Numeric cell value; `None` if absent, blank, unparsable or non-finite.
pub fn parse_cell(raw: Option<&str>) -> Option<f64> {
    let text = raw?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Read every record of one snapshot source.
pub fn read_snapshots<R: Read>(
    reader: R,
    source: Arc<SnapshotSource>,
    ladder: &LadderColumns,
    path: &Path,
) -> Result<Vec<SnapshotInput>, StorageError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let columns = SnapshotColumns::resolve(&headers, ladder, path)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        match result {
            Ok(record) => rows.push(SnapshotInput::new(source.clone(), columns.parse(&record))),
            Err(e) if e.is_io_error() => return Err(StorageError::Csv(e)),
            Err(e) => {
                let line = e.position().map(|p| p.line());
                rows.push(SnapshotInput::malformed(
                    source.clone(),
                    MalformedRow {
                        line,
                        reason: e.to_string(),
                    },
                ));
            }
        }
    }
    Ok(rows)
}

pub fn read_snapshot_file(
    path: &Path,
    source: Arc<SnapshotSource>,
    ladder: &LadderColumns,
) -> Result<Vec<SnapshotInput>, StorageError> {
    let file = File::open(path)?;
    read_snapshots(file, source, ladder, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Arc<SnapshotSource> {
        Arc::new(SnapshotSource::new("AAPL", "AAPL_20240102.csv", "20240102"))
    }

    const HEADER: &str = "ts,bid_px_00,ask_px_00,ask_px_01,ask_sz_00,ask_sz_01,bid_px_01,bid_sz_00,bid_sz_01";

    fn read(body: &str) -> Result<Vec<SnapshotInput>, StorageError> {
        let data = format!("{}\n{}", HEADER, body);
        read_snapshots(
            data.as_bytes(),
            source(),
            &LadderColumns::with_depth(2),
            Path::new("AAPL_20240102.csv"),
        )
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell(Some(" 101.5 ")), Some(101.5));
        assert_eq!(parse_cell(Some("")), None);
        assert_eq!(parse_cell(Some("n/a")), None);
        assert_eq!(parse_cell(Some("NaN")), None);
        assert_eq!(parse_cell(Some("inf")), None);
        assert_eq!(parse_cell(None), None);
    }

    #[test]
    fn test_reads_configured_columns_in_any_order() {
        let rows = read("1,99,101,102,500,300,98,200,100\n").unwrap();
        assert_eq!(rows.len(), 1);
        let book = rows[0].book.as_ref().unwrap();
        assert_eq!(book.best_bid, Some(99.0));
        assert_eq!(book.best_ask, Some(101.0));
        assert_eq!(book.asks.levels()[0], LadderLevel::new(101.0, 500.0));
        assert_eq!(book.asks.levels()[1], LadderLevel::new(102.0, 300.0));
        assert_eq!(book.bids.levels()[0], LadderLevel::new(99.0, 200.0));
        assert_eq!(book.bids.levels()[1], LadderLevel::new(98.0, 100.0));
    }

    #[test]
    fn test_bad_cells_become_missing() {
        let rows = read("1,,101,abc,500,300,98,200,\n").unwrap();
        let book = rows[0].book.as_ref().unwrap();
        assert_eq!(book.best_bid, None);
        assert_eq!(book.asks.levels()[1].price, None);
        assert_eq!(book.asks.levels()[1].size, Some(300.0));
        assert_eq!(book.bids.levels()[1].size, None);
    }

    #[test]
    fn test_framing_error_keeps_row_in_sequence() {
        let rows = read("1,99,101,102,500,300,98,200,100\n2,99,101\n3,99,101,102,500,300,98,200,100\n").unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].book.is_ok());
        let bad = rows[1].book.as_ref().unwrap_err();
        assert_eq!(bad.line, Some(3));
        assert!(rows[2].book.is_ok());
    }

    #[test]
    fn test_missing_header_column_fails_file() {
        let data = "bid_px_00,ask_px_00\n99,101\n";
        let err = read_snapshots(
            data.as_bytes(),
            source(),
            &LadderColumns::with_depth(1),
            Path::new("x.csv"),
        )
        .unwrap_err();
        match err {
            StorageError::MissingColumn { column, .. } => assert_eq!(column, "ask_sz_00"),
            other => panic!("unexpected error {}", other),
        }
    }
}
