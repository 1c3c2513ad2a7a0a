//! Fit and comparison summary CSVs.
//!
//! | File                                   | Columns                                        |
//! |----------------------------------------|------------------------------------------------|
//! | `slippage_linear_summary.csv`          | `ticker,slope,intercept,r2`                    |
//! | `slippage_quadratic_summary.csv`       | `ticker,a,b,c,r2`                              |
//! | `slippage_parametric_summary.csv`      | `ticker,a,b,c,r2`                              |
//! | `slippage_nonparametric_summary.csv`   | `ticker,method,smoothing_param,spline_s,r2`    |
//! | `slippage_all_models_summary.csv`      | `ticker,model,r2`                              |
//! | `r2_summary_by_model.csv`              | `model,mean,std,min,max,count`                 |
//!
//! Absent optional values are written as empty cells.

use super::snapshot_csv::parse_cell;
use super::StorageError;
use crate::comparison::{ComparisonRow, R2Summary};
use crate::fitting::{FitParams, FitResult, Strategy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const COMPARISON_FILE: &str = "slippage_all_models_summary.csv";
pub const R2_SUMMARY_FILE: &str = "r2_summary_by_model.csv";

/// Order in which strategy summaries are stacked for comparison.
pub const COMPARISON_ORDER: [Strategy; 4] = [
    Strategy::Parametric,
    Strategy::Linear,
    Strategy::Quadratic,
    Strategy::Nonparametric,
];

#[derive(Debug, Serialize)]
struct LinearRow<'a> {
    ticker: &'a str,
    slope: f64,
    intercept: f64,
    r2: f64,
}

#[derive(Debug, Serialize)]
struct CoefficientRow<'a> {
    ticker: &'a str,
    a: f64,
    b: f64,
    c: f64,
    r2: f64,
}

#[derive(Debug, Serialize)]
struct NonparametricRow<'a> {
    ticker: &'a str,
    method: &'a str,
    smoothing_param: Option<f64>,
    spline_s: Option<f64>,
    r2: f64,
}

/// Headers are always written by hand so empty tables keep them.
fn create_writer(dir: &Path, name: &str) -> Result<(csv::Writer<fs::File>, PathBuf), StorageError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    let writer = csv::WriterBuilder::new().has_headers(false).from_path(&path)?;
    Ok((writer, path))
}

fn write_header(writer: &mut csv::Writer<fs::File>, strategy: Strategy) -> Result<(), StorageError> {
    let header: &[&str] = match strategy {
        Strategy::Linear => &["ticker", "slope", "intercept", "r2"],
        Strategy::Quadratic | Strategy::Parametric => &["ticker", "a", "b", "c", "r2"],
        Strategy::Nonparametric => &["ticker", "method", "smoothing_param", "spline_s", "r2"],
    };
    writer.write_record(header)?;
    Ok(())
}

/// Write the summary for `strategy` from the matching entries of `results`.
/// The header is always written, so a strategy with no successful fit
/// leaves an empty table rather than no file.
pub fn write_fit_summary(dir: &Path, strategy: Strategy, results: &[FitResult]) -> Result<PathBuf, StorageError> {
    let (mut writer, path) = create_writer(dir, &strategy.summary_file_name())?;
    write_header(&mut writer, strategy)?;

    for result in results.iter().filter(|r| r.kind.strategy() == strategy) {
        let ticker = result.instrument.as_str();
        let r2 = result.r2;
        match result.params {
            FitParams::Linear { slope, intercept } => writer.serialize(LinearRow {
                ticker,
                slope,
                intercept,
                r2,
            })?,
            FitParams::Quadratic { a, b, c } | FitParams::PowerLaw { a, b, c, .. } => {
                writer.serialize(CoefficientRow { ticker, a, b, c, r2 })?
            }
            FitParams::Lowess { frac, .. } => writer.serialize(NonparametricRow {
                ticker,
                method: result.kind.method_label(),
                smoothing_param: Some(frac),
                spline_s: None,
                r2,
            })?,
            FitParams::Spline { smoothing, .. } => writer.serialize(NonparametricRow {
                ticker,
                method: result.kind.method_label(),
                smoothing_param: None,
                spline_s: Some(smoothing),
                r2,
            })?,
        }
    }

    writer.flush()?;
    Ok(path)
}

/// `(ticker, model name, r2)` as read from a strategy summary file. The model
/// name is the raw `method` cell for nonparametric files, the strategy name
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub ticker: String,
    pub model: String,
    pub r2: f64,
}

pub fn read_fit_summary(path: &Path, strategy: Strategy) -> Result<Vec<SummaryRow>, StorageError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let find = |column: &str| {
        headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| StorageError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            })
    };
    let ticker_idx = find("ticker")?;
    let r2_idx = find("r2")?;
    let method_idx = match strategy {
        Strategy::Nonparametric => Some(find("method")?),
        _ => None,
    };

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let model = match method_idx {
            Some(i) => record.get(i).unwrap_or_default().trim().to_string(),
            None => strategy.as_str().to_string(),
        };
        rows.push(SummaryRow {
            ticker: record.get(ticker_idx).unwrap_or_default().to_string(),
            model,
            r2: parse_cell(record.get(r2_idx)).unwrap_or(f64::NAN),
        });
    }
    Ok(rows)
}

/// Rows of every strategy summary found in `dir`, stacked in
/// [`COMPARISON_ORDER`]. Absent files are skipped with a warning.
pub fn read_comparison_inputs(dir: &Path) -> Result<Vec<SummaryRow>, StorageError> {
    let mut rows = Vec::new();
    for strategy in COMPARISON_ORDER {
        let path = dir.join(strategy.summary_file_name());
        if !path.is_file() {
            warn!(strategy = %strategy, path = %path.display(), "Summary file not found, skipping");
            continue;
        }
        rows.extend(read_fit_summary(&path, strategy)?);
    }
    Ok(rows)
}

pub fn write_comparison(dir: &Path, rows: &[ComparisonRow]) -> Result<PathBuf, StorageError> {
    let (mut writer, path) = create_writer(dir, COMPARISON_FILE)?;
    writer.write_record(["ticker", "model", "r2"])?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(path)
}

pub fn write_r2_summary(dir: &Path, summary: &[R2Summary]) -> Result<PathBuf, StorageError> {
    let (mut writer, path) = create_writer(dir, R2_SUMMARY_FILE)?;
    writer.write_record(["model", "mean", "std", "min", "max", "count"])?;
    for row in summary {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::ModelComparator;
    use crate::fitting::FitterKind;
    use tempfile::TempDir;

    fn result(instrument: &str, kind: FitterKind, params: FitParams, r2: f64) -> FitResult {
        FitResult {
            instrument: instrument.to_string(),
            kind,
            params,
            r2,
            fitted: vec![],
            n_points: 3,
        }
    }

    fn results() -> Vec<FitResult> {
        vec![
            result("AAPL", FitterKind::Linear, FitParams::Linear { slope: 0.005, intercept: 0.5 }, 1.0),
            result(
                "AAPL",
                FitterKind::Parametric,
                FitParams::PowerLaw { a: 0.01, b: 0.8, c: 0.5, evaluations: 40 },
                0.99,
            ),
            result("AAPL", FitterKind::Lowess, FitParams::Lowess { frac: 0.5, iterations: 3 }, 0.97),
            result(
                "AAPL",
                FitterKind::Spline,
                FitParams::Spline { smoothing: 1.0, weight: f64::INFINITY },
                0.95,
            ),
        ]
    }

    #[test]
    fn test_linear_summary_layout() {
        let dir = TempDir::new().unwrap();
        let path = write_fit_summary(dir.path(), Strategy::Linear, &results()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ticker,slope,intercept,r2");
        assert_eq!(lines[1], "AAPL,0.005,0.5,1.0");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_nonparametric_summary_layout() {
        let dir = TempDir::new().unwrap();
        let path = write_fit_summary(dir.path(), Strategy::Nonparametric, &results()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ticker,method,smoothing_param,spline_s,r2");
        assert_eq!(lines[1], "AAPL,LOWESS,0.5,,0.97");
        assert_eq!(lines[2], "AAPL,Spline,,1.0,0.95");
    }

    #[test]
    fn test_empty_summary_keeps_header() {
        let dir = TempDir::new().unwrap();
        let path = write_fit_summary(dir.path(), Strategy::Quadratic, &results()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), "ticker,a,b,c,r2");
        assert!(read_fit_summary(&path, Strategy::Quadratic).unwrap().is_empty());
    }

    #[test]
    fn test_read_back_for_comparison_skips_absent_files() {
        let dir = TempDir::new().unwrap();
        for strategy in [Strategy::Linear, Strategy::Parametric, Strategy::Nonparametric] {
            write_fit_summary(dir.path(), strategy, &results()).unwrap();
        }

        let rows = read_comparison_inputs(dir.path()).unwrap();
        let models: Vec<&str> = rows.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, vec!["parametric", "linear", "LOWESS", "Spline"]);

        let mut comparator = ModelComparator::new();
        for row in &rows {
            comparator.add_named(&row.ticker, &row.model, row.r2);
        }
        let out = write_comparison(dir.path(), comparator.rows()).unwrap();
        let text = fs::read_to_string(out).unwrap();
        assert!(text.starts_with("ticker,model,r2\n"));
        assert!(text.contains("AAPL,lowess,0.97"));
        assert!(text.contains("AAPL,spline,0.95"));
    }

    #[test]
    fn test_r2_summary_layout() {
        let dir = TempDir::new().unwrap();
        let mut comparator = ModelComparator::new();
        comparator.add_results(&results());
        let path = write_r2_summary(dir.path(), &comparator.summarize()).unwrap();
        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "model,mean,std,min,max,count");
        assert_eq!(lines[1], "linear,1.0,,1.0,1.0,1");
        assert_eq!(lines.len(), 5);
    }
}
