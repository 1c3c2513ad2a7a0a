//! Pipeline configuration
//!
//! Order sizes, input column keys, fitter parameters and paths. Order sizes
//! map to output columns explicitly; nothing is parsed back out of a name.

use crate::book::{Side, LADDER_DEPTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Side of the simulated market order
    #[serde(default = "default_side")]
    pub side: Side,

    /// Order sizes walked against every snapshot
    #[serde(default)]
    pub sizes: SizeGrid,

    /// Input column keys for the book ladders
    #[serde(default)]
    pub ladder: LadderColumns,

    /// Curve fitter parameters
    #[serde(default)]
    pub fitting: FittingConfig,

    /// Input and output locations
    #[serde(default)]
    pub paths: PathsConfig,
}

fn default_side() -> Side {
    Side::Buy
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            side: Side::Buy,
            sizes: SizeGrid::default(),
            ladder: LadderColumns::default(),
            fitting: FittingConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment or default path
    pub fn from_env() -> Self {
        let path = std::env::var("SLIPPAGE_CONFIG_PATH")
            .unwrap_or_else(|_| "slippage.toml".to_string());

        Self::load(&path).unwrap_or_else(|e| {
            tracing::debug!("Using default pipeline config ({}): {}", path, e);
            Self::default()
        })
    }

    /// Save to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.sizes.validate()?;
        self.ladder.validate()?;
        self.fitting.validate()?;
        Ok(())
    }
}

// =============================================================================
// ORDER SIZES
// =============================================================================

/// One configured order size and the output column that holds its slippage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeColumn {
    pub size: f64,
    pub column: String,
}

/// Ascending order sizes shared by every instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeGrid {
    pub columns: Vec<SizeColumn>,
}

impl Default for SizeGrid {
    fn default() -> Self {
        Self::stepped(100.0, 2000.0, 100.0)
    }
}

impl SizeGrid {
    /// `start, start+step, ..., <= end`, columns named `Slippage_<size>`.
    pub fn stepped(start: f64, end: f64, step: f64) -> Self {
        let mut sizes = Vec::new();
        let mut i = 0u32;
        loop {
            let size = start + step * i as f64;
            if step <= 0.0 || size > end + 1e-9 {
                break;
            }
            sizes.push(size);
            i += 1;
        }
        Self::from_sizes(&sizes)
    }

    /// Explicit sizes with the default column naming.
    pub fn from_sizes(sizes: &[f64]) -> Self {
        Self {
            columns: sizes
                .iter()
                .map(|&size| SizeColumn {
                    size,
                    column: default_size_column(size),
                })
                .collect(),
        }
    }

    pub fn sizes(&self) -> Vec<f64> {
        self.columns.iter().map(|c| c.size).collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.columns.is_empty() {
            anyhow::bail!("at least one order size is required");
        }
        for c in &self.columns {
            if !(c.size.is_finite() && c.size > 0.0) {
                anyhow::bail!("order size {} must be positive", c.size);
            }
            if c.column.trim().is_empty() {
                anyhow::bail!("order size {} has an empty column name", c.size);
            }
        }
        for pair in self.columns.windows(2) {
            if pair[1].size <= pair[0].size {
                anyhow::bail!(
                    "order sizes must be strictly ascending ({} then {})",
                    pair[0].size,
                    pair[1].size
                );
            }
        }
        let mut names: Vec<&str> = self.column_names();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.columns.len() {
            anyhow::bail!("order size column names must be unique");
        }
        Ok(())
    }
}

/// `Slippage_100` for 100, `Slippage_12.5` for 12.5.
pub fn default_size_column(size: f64) -> String {
    if size.fract() == 0.0 {
        format!("Slippage_{}", size as i64)
    } else {
        format!("Slippage_{}", size)
    }
}

// =============================================================================
// INPUT COLUMNS
// =============================================================================

/// Column keys for one ranked level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelColumns {
    pub price: String,
    pub size: String,
}

/// Column keys for the snapshot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderColumns {
    pub best_bid: String,
    pub best_ask: String,
    /// Rank order, best first
    pub asks: Vec<LevelColumns>,
    /// Rank order, best first
    pub bids: Vec<LevelColumns>,
}

impl Default for LadderColumns {
    fn default() -> Self {
        Self::with_depth(LADDER_DEPTH)
    }
}

impl LadderColumns {
    /// `ask_px_00`/`ask_sz_00` ... for `depth` levels per side.
    pub fn with_depth(depth: usize) -> Self {
        let level = |side: &str, i: usize| LevelColumns {
            price: format!("{}_px_{:02}", side, i),
            size: format!("{}_sz_{:02}", side, i),
        };
        Self {
            best_bid: "bid_px_00".to_string(),
            best_ask: "ask_px_00".to_string(),
            asks: (0..depth).map(|i| level("ask", i)).collect(),
            bids: (0..depth).map(|i| level("bid", i)).collect(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.asks.len() > LADDER_DEPTH || self.bids.len() > LADDER_DEPTH {
            anyhow::bail!("ladders are limited to {} levels", LADDER_DEPTH);
        }
        if self.asks.is_empty() && self.bids.is_empty() {
            anyhow::bail!("at least one ladder level column is required");
        }
        Ok(())
    }
}

// =============================================================================
// FITTING
// =============================================================================

/// Curve fitter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittingConfig {
    /// LOWESS neighbourhood fraction
    #[serde(default = "default_lowess_frac")]
    pub lowess_frac: f64,

    /// LOWESS robustifying iterations
    #[serde(default = "default_lowess_iterations")]
    pub lowess_iterations: usize,

    /// Smoothing spline residual target
    #[serde(default = "default_spline_smoothing")]
    pub spline_smoothing: f64,

    /// Power-law model evaluation cap
    #[serde(default = "default_power_law_max_evaluations")]
    pub power_law_max_evaluations: usize,

    /// Power-law starting point (a, b, c)
    #[serde(default = "default_power_law_initial")]
    pub power_law_initial: [f64; 3],
}

fn default_lowess_frac() -> f64 {
    0.5
}
fn default_lowess_iterations() -> usize {
    3
}
fn default_spline_smoothing() -> f64 {
    1.0
}
fn default_power_law_max_evaluations() -> usize {
    10_000
}
fn default_power_law_initial() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

impl Default for FittingConfig {
    fn default() -> Self {
        Self {
            lowess_frac: default_lowess_frac(),
            lowess_iterations: default_lowess_iterations(),
            spline_smoothing: default_spline_smoothing(),
            power_law_max_evaluations: default_power_law_max_evaluations(),
            power_law_initial: default_power_law_initial(),
        }
    }
}

impl FittingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.lowess_frac > 0.0 && self.lowess_frac <= 1.0) {
            anyhow::bail!("lowess_frac must be in (0, 1], got {}", self.lowess_frac);
        }
        if !(self.spline_smoothing.is_finite() && self.spline_smoothing >= 0.0) {
            anyhow::bail!("spline_smoothing must be >= 0, got {}", self.spline_smoothing);
        }
        if self.power_law_max_evaluations == 0 {
            anyhow::bail!("power_law_max_evaluations must be positive");
        }
        Ok(())
    }
}

// =============================================================================
// PATHS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// One sub-directory of snapshot CSVs per instrument
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Per-instrument `slippage_<instrument>.parquet` tables
    #[serde(default = "default_table_dir")]
    pub table_dir: PathBuf,

    /// Fit and comparison summaries
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_table_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            table_dir: default_table_dir(),
            output_dir: default_output_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_size_grid() {
        let grid = SizeGrid::default();
        assert_eq!(grid.len(), 20);
        assert_eq!(grid.columns[0].size, 100.0);
        assert_eq!(grid.columns[19].size, 2000.0);
        assert_eq!(grid.columns[0].column, "Slippage_100");
        assert_eq!(grid.columns[19].column, "Slippage_2000");
        grid.validate().unwrap();
    }

    #[test]
    fn test_size_grid_rejects_unordered() {
        let grid = SizeGrid::from_sizes(&[200.0, 100.0]);
        assert!(grid.validate().is_err());
        let grid = SizeGrid::from_sizes(&[100.0, 100.0]);
        assert!(grid.validate().is_err());
        let grid = SizeGrid::from_sizes(&[-5.0]);
        assert!(grid.validate().is_err());
    }

    #[test]
    fn test_default_ladder_columns() {
        let cols = LadderColumns::default();
        assert_eq!(cols.asks.len(), 10);
        assert_eq!(cols.asks[0].price, "ask_px_00");
        assert_eq!(cols.bids[9].size, "bid_sz_09");
        assert_eq!(cols.best_ask, cols.asks[0].price);
        assert_eq!(cols.best_bid, cols.bids[0].price);
    }

    #[test]
    fn test_toml_roundtrip_and_partial() {
        let config = PipelineConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.sizes, config.sizes);
        assert_eq!(parsed.fitting, config.fitting);

        let partial: PipelineConfig = toml::from_str(
            r#"
            side = "sell"
            [fitting]
            lowess_frac = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(partial.side, Side::Sell);
        assert_eq!(partial.fitting.lowess_frac, 0.3);
        assert_eq!(partial.fitting.power_law_max_evaluations, 10_000);
        assert_eq!(partial.sizes.len(), 20);
    }

    #[test]
    fn test_fractional_column_name() {
        assert_eq!(default_size_column(12.5), "Slippage_12.5");
        assert_eq!(default_size_column(300.0), "Slippage_300");
    }
}
