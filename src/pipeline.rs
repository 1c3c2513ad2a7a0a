//! Pipeline Stages
//!
//! ```text
//! input_dir/<instrument>/*.csv
//!     │  calculate: walk every snapshot for every configured size
//!     ▼
//! table_dir/slippage_<instrument>.parquet
//!     │  fit: mean slippage curve per instrument, every selected strategy
//!     ▼
//! output_dir/slippage_<strategy>_summary.csv
//!     │  compare: stack per-model R² and summarize
//!     ▼
//! output_dir/slippage_all_models_summary.csv, r2_summary_by_model.csv
//! ```
//!
//! # Failure policy
//!
//! Failures stay local. An unreadable snapshot file is skipped, a bad row
//! becomes an undefined record, a fitter that cannot fit an instrument is
//! skipped for that instrument only. Every skip is logged at `warn` with the
//! identifier and the reason. Only failures to reach the top-level
//! directories abort a stage.

use crate::batch::{BatchStats, InstrumentSlippageSeries, MeanSlippageCurve, SnapshotBatchProcessor};
use crate::comparison::{ModelComparator, R2Summary};
use crate::config::{FittingConfig, PipelineConfig};
use crate::fitting::{fitters_for, FitError, FitResult, FitResultsBuilder, FitterKind, Strategy};
use crate::storage::summary_csv::COMPARISON_ORDER;
use crate::storage::{
    discover_instruments, discover_tables, read_comparison_inputs, read_slippage_table,
    read_snapshot_file, write_comparison, write_fit_summary, write_r2_summary, write_slippage_table,
    StorageError,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// =============================================================================
// CALCULATE
// =============================================================================

/// Outcome of the calculation stage for one instrument.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentReport {
    pub instrument: String,
    pub files_read: usize,
    pub files_skipped: usize,
    pub first_row_id: u64,
    pub stats: BatchStats,
    /// `None` when the table could not be written.
    pub table: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CalculateReport {
    pub instruments: Vec<InstrumentReport>,
    pub totals: BatchStats,
    pub next_row_id: u64,
}

/// Table path for an instrument, `slippage_<instrument>.parquet`.
pub fn table_path(table_dir: &Path, instrument: &str) -> PathBuf {
    table_dir.join(format!("slippage_{}.parquet", instrument))
}

/// Walk every snapshot under `paths.input_dir` and write one slippage table
/// per instrument. Row ids run on across instruments in sorted order.
pub fn calculate(config: &PipelineConfig) -> Result<CalculateReport, StorageError> {
    let processor = SnapshotBatchProcessor::from_config(config);
    let instruments = discover_instruments(&config.paths.input_dir)?;
    info!(
        input_dir = %config.paths.input_dir.display(),
        instruments = instruments.len(),
        sizes = config.sizes.len(),
        side = %config.side,
        "Starting slippage calculation"
    );

    let mut report = CalculateReport::default();
    let mut next_row_id = 0u64;

    for inst in instruments {
        let mut rows = Vec::new();
        let mut files_skipped = 0usize;
        for (path, source) in &inst.files {
            match read_snapshot_file(path, source.clone(), &config.ladder) {
                Ok(mut file_rows) => {
                    debug!(file = %path.display(), rows = file_rows.len(), "Read snapshot file");
                    rows.append(&mut file_rows);
                }
                Err(e) => {
                    warn!(instrument = %inst.instrument, file = %path.display(), error = %e, "Skipping snapshot file");
                    files_skipped += 1;
                }
            }
        }

        let first_row_id = next_row_id;
        let output = processor.process(&rows, next_row_id);
        next_row_id = output.next_row_id;

        let path = table_path(&config.paths.table_dir, &inst.instrument);
        let table = match write_slippage_table(&path, &config.sizes, &output.records) {
            Ok(n) => {
                info!(
                    instrument = %inst.instrument,
                    rows = n,
                    malformed = output.stats.malformed_rows,
                    missing_quote = output.stats.missing_quote_rows,
                    undefined_cells = output.stats.undefined_cells,
                    table = %path.display(),
                    "Saved slippage table"
                );
                Some(path)
            }
            Err(e) => {
                warn!(instrument = %inst.instrument, table = %path.display(), error = %e, "Failed to write slippage table");
                None
            }
        };

        report.totals.merge(&output.stats);
        report.instruments.push(InstrumentReport {
            instrument: inst.instrument,
            files_read: inst.files.len() - files_skipped,
            files_skipped,
            first_row_id,
            stats: output.stats,
            table,
        });
    }

    report.next_row_id = next_row_id;
    info!(
        instruments = report.instruments.len(),
        rows = report.totals.rows,
        undefined_cells = report.totals.undefined_cells,
        "Slippage calculation complete"
    );
    Ok(report)
}

// =============================================================================
// FIT
// =============================================================================

/// A fitter that produced nothing for an instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct FitSkip {
    pub instrument: String,
    pub kind: FitterKind,
    pub error: FitError,
}

#[derive(Debug, Clone, Default)]
pub struct FitReport {
    /// Grouped by fitter, instruments in table order within each fitter.
    pub results: Vec<FitResult>,
    pub skipped: Vec<FitSkip>,
    pub summaries: Vec<PathBuf>,
}

/// Mean slippage curve of every readable table in `paths.table_dir`.
pub fn load_curves(config: &PipelineConfig) -> Result<Vec<MeanSlippageCurve>, StorageError> {
    let tables = discover_tables(&config.paths.table_dir)?;
    if tables.is_empty() {
        warn!(table_dir = %config.paths.table_dir.display(), "No slippage tables found");
    }

    let curves = tables
        .par_iter()
        .filter_map(|path| match read_slippage_table(path, &config.sizes) {
            Ok(table) => {
                if !table.missing_sizes.is_empty() {
                    warn!(table = %path.display(), missing = ?table.missing_sizes, "Table lacks configured sizes");
                }
                let series: InstrumentSlippageSeries = table.into_series();
                let curve = series.mean_curve();
                if !curve.undefined_sizes.is_empty() {
                    debug!(
                        instrument = %curve.instrument,
                        undefined = ?curve.undefined_sizes,
                        "Sizes without any defined observation dropped from curve"
                    );
                }
                Some(curve)
            }
            Err(e) => {
                warn!(table = %path.display(), error = %e, "Skipping slippage table");
                None
            }
        })
        .collect();
    Ok(curves)
}

/// Run every fitter of `strategies` over `curves`, instruments in parallel.
pub fn fit_curves(
    curves: &[MeanSlippageCurve],
    strategies: &[Strategy],
    config: &FittingConfig,
) -> (Vec<FitResult>, Vec<FitSkip>) {
    let fitters = fitters_for(strategies, config);
    let mut builder = FitResultsBuilder::with_capacity(fitters.len() * curves.len());
    let mut skipped = Vec::new();

    for fitter in &fitters {
        let outcomes: Vec<Result<FitResult, FitError>> = curves.par_iter().map(|c| fitter.fit(c)).collect();

        for (curve, outcome) in curves.iter().zip(outcomes) {
            match outcome {
                Ok(result) => {
                    info!(instrument = %result.instrument, fitter = %result.kind, r2 = result.r2, "Fit complete");
                    builder.push(result);
                }
                Err(error) => {
                    warn!(instrument = %curve.instrument, fitter = %fitter.kind(), error = %error, "Fit skipped");
                    skipped.push(FitSkip {
                        instrument: curve.instrument.clone(),
                        kind: fitter.kind(),
                        error,
                    });
                }
            }
        }
    }

    (builder.finish(), skipped)
}

/// Mean R² per fitter, ordered by fitter name.
pub fn average_r2(results: &[FitResult]) -> BTreeMap<&'static str, f64> {
    let mut sums: BTreeMap<&'static str, (f64, usize)> = BTreeMap::new();
    for r in results {
        let e = sums.entry(r.kind.as_str()).or_insert((0.0, 0));
        e.0 += r.r2;
        e.1 += 1;
    }
    sums.into_iter().map(|(k, (s, n))| (k, s / n as f64)).collect()
}

/// Fit every table and write one summary per strategy.
pub fn fit(config: &PipelineConfig, strategies: &[Strategy]) -> Result<FitReport, StorageError> {
    let curves = load_curves(config)?;
    info!(instruments = curves.len(), strategies = ?strategies, "Starting curve fitting");

    let (results, skipped) = fit_curves(&curves, strategies, &config.fitting);

    let mut summaries = Vec::with_capacity(strategies.len());
    for &strategy in strategies {
        let path = write_fit_summary(&config.paths.output_dir, strategy, &results)?;
        info!(strategy = %strategy, path = %path.display(), "Saved fit summary");
        summaries.push(path);
    }

    if results.is_empty() {
        warn!("No successful fits to compute average R²");
    } else {
        for (fitter, mean) in average_r2(&results) {
            info!(fitter = fitter, mean_r2 = mean, "Average R²");
        }
    }

    Ok(FitReport {
        results,
        skipped,
        summaries,
    })
}

// =============================================================================
// COMPARE
// =============================================================================

#[derive(Debug, Clone)]
pub struct CompareReport {
    pub rows: usize,
    pub summary: Vec<R2Summary>,
    /// Model with the highest mean R².
    pub best: Option<R2Summary>,
    pub comparison_path: PathBuf,
    pub summary_path: PathBuf,
}

fn finish_comparison(comparator: ModelComparator, output_dir: &Path) -> Result<CompareReport, StorageError> {
    let summary = comparator.summarize();
    let comparison_path = write_comparison(output_dir, comparator.rows())?;
    let summary_path = write_r2_summary(output_dir, &summary)?;

    for s in &summary {
        info!(
            model = %s.model,
            mean = s.mean,
            std = ?s.std,
            min = s.min,
            max = s.max,
            count = s.count,
            "R² summary"
        );
    }
    let best = comparator.best_model();
    match &best {
        Some(b) => info!(model = %b.model, mean_r2 = b.mean, "Best model by mean R²"),
        None => warn!("No comparable fit results"),
    }
    info!(path = %comparison_path.display(), rows = comparator.len(), "Saved combined model results");

    Ok(CompareReport {
        rows: comparator.len(),
        summary,
        best,
        comparison_path,
        summary_path,
    })
}

/// Compare in-process results. Rows are stacked parametric, linear,
/// quadratic, then nonparametric.
pub fn compare_results(results: &[FitResult], output_dir: &Path) -> Result<CompareReport, StorageError> {
    let mut comparator = ModelComparator::new();
    for strategy in COMPARISON_ORDER {
        let group: Vec<FitResult> = results
            .iter()
            .filter(|r| r.kind.strategy() == strategy)
            .cloned()
            .collect();
        comparator.add_results(&group);
    }
    finish_comparison(comparator, output_dir)
}

/// Compare from the strategy summaries already in `output_dir`.
pub fn compare_from_files(output_dir: &Path) -> Result<CompareReport, StorageError> {
    let mut comparator = ModelComparator::new();
    for row in read_comparison_inputs(output_dir)? {
        comparator.add_named(&row.ticker, &row.model, row.r2);
    }
    finish_comparison(comparator, output_dir)
}

// =============================================================================
// RUN ALL
// =============================================================================

#[derive(Debug, Clone)]
pub struct RunReport {
    pub calculate: CalculateReport,
    pub fit: FitReport,
    pub compare: CompareReport,
}

/// calculate, then fit with every strategy, then compare in-process.
pub fn run_all(config: &PipelineConfig) -> Result<RunReport, StorageError> {
    let calculate = calculate(config)?;
    let fit = fit(config, &Strategy::ALL)?;
    let compare = compare_results(&fit.results, &config.paths.output_dir)?;
    Ok(RunReport {
        calculate,
        fit,
        compare,
    })
}
