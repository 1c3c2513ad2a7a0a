//! Per-instrument slippage table (parquet).
//!
//! One row per snapshot. One nullable `Float64` column per configured size,
//! named through the size grid, followed by the provenance columns `Ticker`,
//! `File_Name`, `Row_ID` and `Date`. An undefined observation is a null.

use super::discovery::instrument_from_table;
use super::StorageError;
use crate::batch::{InstrumentSlippageSeries, SlippageRecord};
use crate::config::SizeGrid;
use arrow::array::*;
use arrow::compute::cast;
use arrow::datatypes::*;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const TICKER_COLUMN: &str = "Ticker";
pub const FILE_NAME_COLUMN: &str = "File_Name";
pub const ROW_ID_COLUMN: &str = "Row_ID";
pub const DATE_COLUMN: &str = "Date";

fn writer_props() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::UNCOMPRESSED)
        .build()
}

// ---------- Schema ----------
pub fn slippage_schema(grid: &SizeGrid) -> SchemaRef {
    let mut fields: Vec<Field> = grid
        .columns
        .iter()
        .map(|c| Field::new(c.column.as_str(), DataType::Float64, true))
        .collect();
    fields.push(Field::new(TICKER_COLUMN, DataType::Utf8, false));
    fields.push(Field::new(FILE_NAME_COLUMN, DataType::Utf8, false));
    fields.push(Field::new(ROW_ID_COLUMN, DataType::Int64, false));
    fields.push(Field::new(DATE_COLUMN, DataType::Utf8, false));
    Arc::new(Schema::new(fields))
}

// ---------- Writer ----------
fn to_batch(grid: &SizeGrid, records: &[SlippageRecord]) -> Result<RecordBatch, StorageError> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(grid.len() + 4);

    for col in 0..grid.len() {
        let mut values = Float64Builder::with_capacity(records.len());
        for r in records {
            match r.slippage.get(col).copied().flatten() {
                Some(v) => values.append_value(v),
                None => values.append_null(),
            }
        }
        columns.push(Arc::new(values.finish()));
    }

    let mut ticker = StringBuilder::new();
    let mut file_name = StringBuilder::new();
    let mut row_id = Int64Builder::with_capacity(records.len());
    let mut date = StringBuilder::new();
    for r in records {
        ticker.append_value(&r.instrument);
        file_name.append_value(&r.source_file);
        row_id.append_value(r.row_id as i64);
        date.append_value(&r.date);
    }
    columns.push(Arc::new(ticker.finish()));
    columns.push(Arc::new(file_name.finish()));
    columns.push(Arc::new(row_id.finish()));
    columns.push(Arc::new(date.finish()));

    Ok(RecordBatch::try_new(slippage_schema(grid), columns)?)
}

/// Write `records` to `path`, replacing any existing file. Returns the row
/// count.
pub fn write_slippage_table(path: &Path, grid: &SizeGrid, records: &[SlippageRecord]) -> Result<usize, StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, slippage_schema(grid), Some(writer_props()))?;
    let batch = to_batch(grid, records)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(records.len())
}

// ---------- Reader ----------

/// A slippage table read back against a size grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SlippageTable {
    pub instrument: String,
    /// Configured sizes whose column is present, in grid order.
    pub sizes: Vec<f64>,
    /// Configured sizes whose column is absent.
    pub missing_sizes: Vec<f64>,
    /// `slippage` aligned with `sizes`.
    pub records: Vec<SlippageRecord>,
}

impl SlippageTable {
    pub fn into_series(self) -> InstrumentSlippageSeries {
        InstrumentSlippageSeries::new(self.instrument, self.sizes, self.records)
    }
}

/// Column `idx` as `to`, casting when the file stored another type.
fn column_cast(batch: &RecordBatch, idx: usize, to: &DataType, path: &Path) -> Result<ArrayRef, StorageError> {
    let col = batch.column(idx);
    if col.data_type() == to {
        return Ok(col.clone());
    }
    cast(col, to).map_err(|e| StorageError::Schema {
        path: path.to_path_buf(),
        reason: format!("column {} cannot be read as {}: {}", batch.schema().field(idx).name(), to, e),
    })
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, path: &Path) -> Result<&'a T, StorageError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StorageError::Schema {
            path: path.to_path_buf(),
            reason: "unexpected column type".to_string(),
        })
}

/// Read a table written by [`write_slippage_table`], or by an earlier run
/// with a compatible column layout.
pub fn read_slippage_table(path: &Path, grid: &SizeGrid) -> Result<SlippageTable, StorageError> {
    let file = fs::File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();

    let mut size_idx = Vec::new();
    let mut sizes = Vec::new();
    let mut missing_sizes = Vec::new();
    for c in &grid.columns {
        match schema.index_of(&c.column) {
            Ok(idx) => {
                size_idx.push(idx);
                sizes.push(c.size);
            }
            Err(_) => missing_sizes.push(c.size),
        }
    }
    if size_idx.is_empty() {
        return Err(StorageError::Schema {
            path: path.to_path_buf(),
            reason: "no configured slippage columns".to_string(),
        });
    }

    let row_idx = schema.index_of(ROW_ID_COLUMN).map_err(|_| StorageError::MissingColumn {
        path: path.to_path_buf(),
        column: ROW_ID_COLUMN.to_string(),
    })?;
    let ticker_idx = schema.index_of(TICKER_COLUMN).ok();
    let file_idx = schema.index_of(FILE_NAME_COLUMN).ok();
    let date_idx = schema.index_of(DATE_COLUMN).ok();

    let fallback_instrument = instrument_from_table(path).unwrap_or_default();
    let mut records = Vec::new();
    let reader = builder.build()?;

    for batch in reader {
        let batch = batch?;
        let n = batch.num_rows();

        let mut values = Vec::with_capacity(size_idx.len());
        for &idx in &size_idx {
            values.push(column_cast(&batch, idx, &DataType::Float64, path)?);
        }
        let values = values
            .iter()
            .map(|a| downcast::<Float64Array>(a, path))
            .collect::<Result<Vec<_>, _>>()?;

        let row_ids = column_cast(&batch, row_idx, &DataType::Int64, path)?;
        let row_ids = downcast::<Int64Array>(&row_ids, path)?;

        let text = |idx: Option<usize>| -> Result<Option<ArrayRef>, StorageError> {
            idx.map(|i| column_cast(&batch, i, &DataType::Utf8, path)).transpose()
        };
        let tickers = text(ticker_idx)?;
        let files = text(file_idx)?;
        let dates = text(date_idx)?;
        let tickers = tickers.as_ref().map(|a| downcast::<StringArray>(a, path)).transpose()?;
        let files = files.as_ref().map(|a| downcast::<StringArray>(a, path)).transpose()?;
        let dates = dates.as_ref().map(|a| downcast::<StringArray>(a, path)).transpose()?;

        let string_at = |array: Option<&StringArray>, i: usize, default: &str| -> String {
            match array {
                Some(a) if !a.is_null(i) => a.value(i).to_string(),
                _ => default.to_string(),
            }
        };

        for i in 0..n {
            if row_ids.is_null(i) || row_ids.value(i) < 0 {
                return Err(StorageError::Schema {
                    path: path.to_path_buf(),
                    reason: format!("invalid {} at row {}", ROW_ID_COLUMN, i),
                });
            }
            let slippage = values
                .iter()
                .map(|col| (!col.is_null(i)).then(|| col.value(i)).filter(|v| v.is_finite()))
                .collect();
            records.push(SlippageRecord {
                instrument: string_at(tickers, i, &fallback_instrument),
                source_file: string_at(files, i, ""),
                row_id: row_ids.value(i) as u64,
                date: string_at(dates, i, "Unknown"),
                slippage,
            });
        }
    }

    let instrument = records
        .first()
        .map(|r| r.instrument.clone())
        .unwrap_or(fallback_instrument);

    Ok(SlippageTable {
        instrument,
        sizes,
        missing_sizes,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn records() -> Vec<SlippageRecord> {
        vec![
            SlippageRecord {
                instrument: "AAPL".to_string(),
                source_file: "AAPL_20240102.csv".to_string(),
                row_id: 0,
                date: "20240102".to_string(),
                slippage: vec![Some(1.0), Some(1.25), None],
            },
            SlippageRecord {
                instrument: "AAPL".to_string(),
                source_file: "AAPL_20240102.csv".to_string(),
                row_id: 1,
                date: "20240102".to_string(),
                slippage: vec![Some(0.123456789012345), None, None],
            },
            SlippageRecord {
                instrument: "AAPL".to_string(),
                source_file: "AAPL_20240103.csv".to_string(),
                row_id: 2,
                date: "20240103".to_string(),
                slippage: vec![None, None, None],
            },
        ]
    }

    #[test]
    fn test_round_trip_preserves_rows_columns_and_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slippage_AAPL.parquet");
        let grid = SizeGrid::from_sizes(&[100.0, 200.0, 300.0]);
        let written = records();

        assert_eq!(write_slippage_table(&path, &grid, &written).unwrap(), 3);
        let table = read_slippage_table(&path, &grid).unwrap();

        assert_eq!(table.instrument, "AAPL");
        assert_eq!(table.sizes, vec![100.0, 200.0, 300.0]);
        assert!(table.missing_sizes.is_empty());
        assert_eq!(table.records.len(), written.len());

        for (a, b) in table.records.iter().zip(&written) {
            assert_eq!(a.row_id, b.row_id);
            assert_eq!(a.source_file, b.source_file);
            assert_eq!(a.date, b.date);
            for (x, y) in a.slippage.iter().zip(&b.slippage) {
                match (x, y) {
                    (Some(x), Some(y)) => assert!((x - y).abs() < 1e-9),
                    (None, None) => {}
                    other => panic!("mismatch {:?}", other),
                }
            }
        }

        let file = fs::File::open(&path).unwrap();
        let schema = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().schema().clone();
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(
            names,
            vec!["Slippage_100", "Slippage_200", "Slippage_300", "Ticker", "File_Name", "Row_ID", "Date"]
        );
    }

    #[test]
    fn test_read_with_wider_grid_reports_missing_sizes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slippage_AAPL.parquet");
        write_slippage_table(&path, &SizeGrid::from_sizes(&[100.0, 200.0, 300.0]), &records()).unwrap();

        let wider = SizeGrid::from_sizes(&[100.0, 200.0, 300.0, 400.0]);
        let table = read_slippage_table(&path, &wider).unwrap();
        assert_eq!(table.missing_sizes, vec![400.0]);

        let series = table.into_series();
        assert_eq!(series.get(0, 200.0), Some(1.25));
        assert_eq!(series.len(), 3);
    }

    #[test]
    fn test_no_configured_columns_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slippage_AAPL.parquet");
        write_slippage_table(&path, &SizeGrid::from_sizes(&[100.0, 200.0, 300.0]), &records()).unwrap();

        let other = SizeGrid::from_sizes(&[5_000.0]);
        assert!(matches!(
            read_slippage_table(&path, &other),
            Err(StorageError::Schema { .. })
        ));
    }

    #[test]
    fn test_empty_table_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("slippage_EMPTY.parquet");
        let grid = SizeGrid::from_sizes(&[100.0]);
        assert_eq!(write_slippage_table(&path, &grid, &[]).unwrap(), 0);

        let table = read_slippage_table(&path, &grid).unwrap();
        assert_eq!(table.instrument, "EMPTY");
        assert!(table.records.is_empty());
    }
}
