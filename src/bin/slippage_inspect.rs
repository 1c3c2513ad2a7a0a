//! Slippage Table Inspection Tool
//!
//! Prints the first rows of every `slippage_*.parquet` table in a directory,
//! or a machine-readable summary of each.
//!
//! Usage:
//!   slippage_inspect --dir ./tables
//!   slippage_inspect --dir ./tables --rows 25
//!   slippage_inspect --dir ./tables --json --output inspect.json

use anyhow::{Context, Result};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::Utc;
use clap::Parser;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Serialize;
use slippage_lab::config::SizeGrid;
use slippage_lab::storage::{discover_tables, read_slippage_table};
use slippage_lab::PipelineConfig;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Inspect per-instrument slippage tables
#[derive(Parser, Debug)]
#[command(name = "slippage_inspect")]
#[command(about = "Print the head of each slippage table, or a JSON summary")]
struct Cli {
    /// Directory holding slippage_<instrument>.parquet tables
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Rows to print per table
    #[arg(short, long, default_value = "10")]
    rows: usize,

    /// Emit a JSON summary instead of table heads
    #[arg(long)]
    json: bool,

    /// Write the JSON summary here (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pipeline config providing the size → column mapping
    #[arg(short, long, env = "SLIPPAGE_CONFIG_PATH")]
    config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct TableSummary {
    path: String,
    instrument: String,
    rows: usize,
    columns: Vec<String>,
    /// Non-null observations per configured size present in the table
    defined_counts: Vec<SizeCount>,
    missing_sizes: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct SizeCount {
    size: f64,
    defined: usize,
}

#[derive(Debug, Serialize)]
struct InspectReport {
    generated_at: String,
    dir: String,
    tables: Vec<TableSummary>,
    errors: Vec<FileError>,
}

#[derive(Debug, Serialize)]
struct FileError {
    path: String,
    error: String,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slippage_lab=info,slippage_inspect=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path).with_context(|| format!("Failed to load config: {:?}", path))?,
        None => PipelineConfig::from_env(),
    };

    let tables = discover_tables(&cli.dir)
        .with_context(|| format!("Failed to list tables in {:?}", cli.dir))?;

    if cli.json {
        let report = summarize(&cli.dir, &tables, &config.sizes);
        let json = serde_json::to_string_pretty(&report)?;
        match &cli.output {
            Some(path) => {
                std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
                println!("Summary written to {:?}", path);
            }
            None => println!("{}", json),
        }
        return Ok(());
    }

    if tables.is_empty() {
        println!("No slippage tables found in {:?}", cli.dir);
        return Ok(());
    }

    for path in &tables {
        println!("\n=== File: {} ===", path.display());
        if let Err(e) = print_head(path, cli.rows) {
            warn!(file = %path.display(), error = %e, "Error reading table");
            println!("Error reading {}: {}", path.display(), e);
        }
    }

    Ok(())
}

fn print_head(path: &Path, limit: usize) -> Result<()> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let total = builder.metadata().file_metadata().num_rows();
    let names: Vec<String> = builder.schema().fields().iter().map(|f| f.name().clone()).collect();
    let reader = builder.with_batch_size(limit.max(1)).build()?;

    let mut lines: Vec<Vec<String>> = Vec::new();
    let options = FormatOptions::default().with_null("NaN");
    for batch in reader {
        let batch = batch?;
        let formatters = batch
            .columns()
            .iter()
            .map(|c| ArrayFormatter::try_new(c.as_ref(), &options))
            .collect::<Result<Vec<_>, _>>()?;
        for i in 0..batch.num_rows() {
            if lines.len() >= limit {
                break;
            }
            lines.push(formatters.iter().map(|f| f.value(i).to_string()).collect());
        }
        if lines.len() >= limit {
            break;
        }
    }

    let widths: Vec<usize> = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            lines
                .iter()
                .map(|row| row[j].len())
                .chain(std::iter::once(name.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:>width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", render(&names));
    for row in &lines {
        println!("{}", render(row));
    }
    println!("[{} of {} rows]", lines.len(), total);
    Ok(())
}

fn summarize(dir: &Path, tables: &[PathBuf], grid: &SizeGrid) -> InspectReport {
    let mut summaries = Vec::new();
    let mut errors = Vec::new();

    for path in tables {
        let columns = File::open(path)
            .map_err(anyhow::Error::from)
            .and_then(|f| Ok(ParquetRecordBatchReaderBuilder::try_new(f)?))
            .map(|b| b.schema().fields().iter().map(|f| f.name().clone()).collect::<Vec<_>>());

        match (columns, read_slippage_table(path, grid)) {
            (Ok(columns), Ok(table)) => {
                let missing_sizes = table.missing_sizes.clone();
                let instrument = table.instrument.clone();
                let rows = table.records.len();
                let series = table.into_series();
                let defined_counts = series
                    .sizes()
                    .iter()
                    .zip(series.defined_counts())
                    .map(|(&size, defined)| SizeCount { size, defined })
                    .collect();
                summaries.push(TableSummary {
                    path: path.display().to_string(),
                    instrument,
                    rows,
                    columns,
                    defined_counts,
                    missing_sizes,
                });
            }
            (Err(e), _) => {
                warn!(file = %path.display(), error = %e, "Error reading table");
                errors.push(FileError {
                    path: path.display().to_string(),
                    error: e.to_string(),
                });
            }
            (_, Err(e)) => {
                warn!(file = %path.display(), error = %e, "Error reading table");
                errors.push(FileError {
                    path: path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    InspectReport {
        generated_at: Utc::now().to_rfc3339(),
        dir: dir.display().to_string(),
        tables: summaries,
        errors,
    }
}
