//! On-disk formats: raw snapshot CSVs in, per-instrument parquet tables and
//! CSV summaries out.

pub mod discovery;
pub mod slippage_table;
pub mod snapshot_csv;
pub mod summary_csv;

pub use discovery::{
    date_label, discover_instruments, discover_tables, instrument_from_table, InstrumentFiles,
};
pub use slippage_table::{read_slippage_table, slippage_schema, write_slippage_table, SlippageTable};
pub use snapshot_csv::{parse_cell, read_snapshot_file, read_snapshots, SnapshotColumns};
pub use summary_csv::{
    read_comparison_inputs, read_fit_summary, write_comparison, write_fit_summary, write_r2_summary,
    SummaryRow, COMPARISON_FILE, R2_SUMMARY_FILE,
};

use std::path::PathBuf;

/// Errors from reading or writing pipeline files.
#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Csv(csv::Error),
    Parquet(parquet::errors::ParquetError),
    Arrow(arrow::error::ArrowError),
    /// A required column is absent from a file header or schema.
    MissingColumn { path: PathBuf, column: String },
    /// A column exists but has the wrong type, or the file is otherwise unusable.
    Schema { path: PathBuf, reason: String },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Csv(e) => write!(f, "CSV error: {}", e),
            Self::Parquet(e) => write!(f, "Parquet error: {}", e),
            Self::Arrow(e) => write!(f, "Arrow error: {}", e),
            Self::MissingColumn { path, column } => {
                write!(f, "{}: missing column {}", path.display(), column)
            }
            Self::Schema { path, reason } => write!(f, "{}: {}", path.display(), reason),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<csv::Error> for StorageError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl From<parquet::errors::ParquetError> for StorageError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        Self::Parquet(e)
    }
}

impl From<arrow::error::ArrowError> for StorageError {
    fn from(e: arrow::error::ArrowError) -> Self {
        Self::Arrow(e)
    }
}
