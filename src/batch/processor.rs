//! Snapshot Batch Processor
//!
//! Walks every snapshot of one instrument for a fixed grid of order sizes and
//! emits one [`SlippageRecord`] per snapshot.
//!
//! # Determinism
//!
//! Snapshots are fanned out with an indexed rayon iterator, so records come
//! back in input order and row ids are `row_id_start + position`. Running the
//! processor twice over the same input yields identical output.
//!
//! # Failure policy
//!
//! A malformed row produces a record whose size fields are all undefined; a
//! snapshot without a usable best bid/ask does the same. Neither aborts the
//! batch.

use crate::book::{slippage_profile, BookSnapshot, Side, Size};
use crate::config::PipelineConfig;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Provenance shared by all rows read from one source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotSource {
    pub instrument: String,
    pub file_name: String,
    /// Date label supplied by discovery.
    pub date: String,
}

impl SnapshotSource {
    pub fn new(
        instrument: impl Into<String>,
        file_name: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            file_name: file_name.into(),
            date: date.into(),
        }
    }
}

/// A source row that could not be turned into a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformedRow {
    /// 1-based line in the source file, when known.
    pub line: Option<u64>,
    pub reason: String,
}

impl std::fmt::Display for MalformedRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

/// One input row in source order.
#[derive(Debug, Clone)]
pub struct SnapshotInput {
    pub source: Arc<SnapshotSource>,
    pub book: Result<BookSnapshot, MalformedRow>,
}

impl SnapshotInput {
    pub fn new(source: Arc<SnapshotSource>, book: BookSnapshot) -> Self {
        Self {
            source,
            book: Ok(book),
        }
    }

    pub fn malformed(source: Arc<SnapshotSource>, row: MalformedRow) -> Self {
        Self {
            source,
            book: Err(row),
        }
    }
}

/// Slippage for every configured size, plus provenance, for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlippageRecord {
    pub instrument: String,
    pub source_file: String,
    pub row_id: u64,
    pub date: String,
    /// Aligned with the processor's sizes; `None` = undefined.
    pub slippage: Vec<Option<f64>>,
}

/// Counters for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub rows: u64,
    pub malformed_rows: u64,
    /// Rows without a usable best bid/ask.
    pub missing_quote_rows: u64,
    /// Undefined (row, size) cells, all causes.
    pub undefined_cells: u64,
}

impl BatchStats {
    pub fn merge(&mut self, other: &BatchStats) {
        self.rows += other.rows;
        self.malformed_rows += other.malformed_rows;
        self.missing_quote_rows += other.missing_quote_rows;
        self.undefined_cells += other.undefined_cells;
    }
}

/// Output of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput {
    pub records: Vec<SlippageRecord>,
    /// First row id not used by this batch.
    pub next_row_id: u64,
    pub stats: BatchStats,
}

/// Runs the book walker over a batch of snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotBatchProcessor {
    side: Side,
    sizes: Vec<Size>,
}

impl SnapshotBatchProcessor {
    pub fn new(side: Side, sizes: Vec<Size>) -> Self {
        Self { side, sizes }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.side, config.sizes.sizes())
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn sizes(&self) -> &[Size] {
        &self.sizes
    }

    /// Process `rows` in order, numbering them from `row_id_start`.
    pub fn process(&self, rows: &[SnapshotInput], row_id_start: u64) -> BatchOutput {
        let records: Vec<SlippageRecord> = rows
            .par_iter()
            .enumerate()
            .map(|(idx, row)| self.process_row(row, row_id_start + idx as u64))
            .collect();

        let mut stats = BatchStats {
            rows: rows.len() as u64,
            ..Default::default()
        };
        for (row, record) in rows.iter().zip(&records) {
            match &row.book {
                Err(_) => stats.malformed_rows += 1,
                Ok(book) if book.mid_price().is_none() => stats.missing_quote_rows += 1,
                Ok(_) => {}
            }
            stats.undefined_cells += record.slippage.iter().filter(|v| v.is_none()).count() as u64;
        }

        BatchOutput {
            records,
            next_row_id: row_id_start + rows.len() as u64,
            stats,
        }
    }

    fn process_row(&self, row: &SnapshotInput, row_id: u64) -> SlippageRecord {
        let slippage = match &row.book {
            Ok(book) => slippage_profile(book, self.side, &self.sizes),
            Err(_) => vec![None; self.sizes.len()],
        };
        SlippageRecord {
            instrument: row.source.instrument.clone(),
            source_file: row.source.file_name.clone(),
            row_id,
            date: row.source.date.clone(),
            slippage,
        }
    }
}
