//! Slippage Lab CLI
//!
//! Usage:
//!   slippage calculate --input-dir ./snapshots --table-dir ./tables
//!   slippage fit --model parametric --model linear
//!   slippage compare --from-files
//!   slippage run-all
//!   slippage init-config --path slippage.toml

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use slippage_lab::book::Side;
use slippage_lab::config::SizeGrid;
use slippage_lab::fitting::Strategy;
use slippage_lab::pipeline;
use slippage_lab::PipelineConfig;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Order book slippage estimation and cost-curve fitting
#[derive(Parser, Debug)]
#[command(name = "slippage")]
#[command(about = "Estimate order book slippage and fit cost curves per instrument")]
struct Cli {
    /// Pipeline config (TOML). Defaults are used when the file is absent.
    #[arg(short, long, env = "SLIPPAGE_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Root holding one sub-directory of snapshot CSVs per instrument
    #[arg(long, env = "SLIPPAGE_INPUT_DIR")]
    input_dir: Option<PathBuf>,

    /// Directory for slippage_<instrument>.parquet tables
    #[arg(long, env = "SLIPPAGE_TABLE_DIR")]
    table_dir: Option<PathBuf>,

    /// Directory for fit and comparison summaries
    #[arg(long, env = "SLIPPAGE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Side of the simulated market order (buy or sell)
    #[arg(long)]
    side: Option<Side>,

    /// Order sizes, comma separated (e.g. 100,200,500)
    #[arg(long, value_delimiter = ',')]
    sizes: Option<Vec<f64>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk every snapshot and write one slippage table per instrument
    Calculate,

    /// Fit cost curves to every slippage table
    Fit {
        /// Strategies to run (repeatable)
        #[arg(short, long = "model", value_enum, default_value = "all")]
        models: Vec<ModelArg>,
    },

    /// Stack per-model R² across instruments and summarize
    Compare {
        /// Read the strategy summaries in the output directory instead of refitting
        #[arg(long)]
        from_files: bool,
    },

    /// calculate, fit (all strategies) and compare in one run
    RunAll,

    /// Write the effective configuration as TOML
    InitConfig {
        #[arg(short, long, default_value = "slippage.toml")]
        path: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModelArg {
    Linear,
    Quadratic,
    Parametric,
    Nonparametric,
    All,
}

fn strategies(models: &[ModelArg]) -> Vec<Strategy> {
    if models.is_empty() || models.contains(&ModelArg::All) {
        return Strategy::ALL.to_vec();
    }
    let mut out = Vec::new();
    for m in models {
        let s = match m {
            ModelArg::Linear => Strategy::Linear,
            ModelArg::Quadratic => Strategy::Quadratic,
            ModelArg::Parametric => Strategy::Parametric,
            ModelArg::Nonparametric => Strategy::Nonparametric,
            ModelArg::All => continue,
        };
        if !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

fn main() -> Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    match cli.command {
        Commands::Calculate => {
            let report = pipeline::calculate(&config)?;
            info!(
                instruments = report.instruments.len(),
                rows = report.totals.rows,
                "Done"
            );
        }
        Commands::Fit { models } => {
            let report = pipeline::fit(&config, &strategies(&models))?;
            info!(
                fits = report.results.len(),
                skipped = report.skipped.len(),
                "Done"
            );
        }
        Commands::Compare { from_files } => {
            let report = if from_files {
                pipeline::compare_from_files(&config.paths.output_dir)?
            } else {
                let curves = pipeline::load_curves(&config)?;
                let (results, _) = pipeline::fit_curves(&curves, &Strategy::ALL, &config.fitting);
                pipeline::compare_results(&results, &config.paths.output_dir)?
            };
            print_summary(&report);
        }
        Commands::RunAll => {
            let report = pipeline::run_all(&config)?;
            print_summary(&report.compare);
        }
        Commands::InitConfig { path } => {
            config
                .save(&path)
                .with_context(|| format!("Failed to write config: {:?}", path))?;
            info!(path = %path.display(), "Wrote pipeline config");
        }
    }

    Ok(())
}

/// File (or defaults), then CLI/env overrides.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) if path.exists() => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config: {:?}", path))?,
        Some(path) => {
            info!(path = %path.display(), "Config file not found, using defaults");
            PipelineConfig::default()
        }
        None => PipelineConfig::from_env(),
    };

    if let Some(dir) = &cli.input_dir {
        config.paths.input_dir = dir.clone();
    }
    if let Some(dir) = &cli.table_dir {
        config.paths.table_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.paths.output_dir = dir.clone();
    }
    if let Some(side) = cli.side {
        config.side = side;
    }
    if let Some(sizes) = &cli.sizes {
        config.sizes = SizeGrid::from_sizes(sizes);
    }

    config.validate().context("Invalid pipeline configuration")?;
    Ok(config)
}

fn print_summary(report: &pipeline::CompareReport) {
    println!();
    println!("=== R² Summary by Model ===");
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>6}",
        "model", "mean", "std", "min", "max", "count"
    );
    for s in &report.summary {
        let std = s.std.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:>10.4} {:>10} {:>10.4} {:>10.4} {:>6}",
            s.model.as_str(),
            s.mean,
            std,
            s.min,
            s.max,
            s.count
        );
    }
    if let Some(best) = &report.best {
        println!();
        println!("Best model: {} (mean R² {:.4})", best.model.as_str(), best.mean);
    }
    println!();
    println!("Combined results: {}", report.comparison_path.display());
    println!("Summary:          {}", report.summary_path.display());
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slippage_lab=info,slippage=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate root.
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        assert_eq!(strategies(&[ModelArg::All]), Strategy::ALL.to_vec());
        assert_eq!(strategies(&[]), Strategy::ALL.to_vec());
        assert_eq!(
            strategies(&[ModelArg::Parametric, ModelArg::Linear, ModelArg::Parametric]),
            vec![Strategy::Parametric, Strategy::Linear]
        );
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "slippage",
            "--config",
            "/nonexistent/slippage.toml",
            "--input-dir",
            "in",
            "--side",
            "sell",
            "--sizes",
            "100,250",
            "fit",
            "--model",
            "linear",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.paths.input_dir, PathBuf::from("in"));
        assert_eq!(config.side, Side::Sell);
        assert_eq!(config.sizes.sizes(), vec![100.0, 250.0]);
        match cli.command {
            Commands::Fit { models } => assert_eq!(models, vec![ModelArg::Linear]),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
