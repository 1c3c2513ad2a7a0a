//! Slippage Lab Library
//!
//! Estimates the market-impact cost of hypothetical market orders against
//! historical order book snapshots, then fits competing cost curves per
//! instrument and ranks them by goodness of fit.
//!
//! Exposes the core modules for use by the binaries and integration tests:
//!
//! - [`book`]: snapshots and the market-order book walker
//! - [`batch`]: per-instrument batch processing and mean slippage curves
//! - [`fitting`]: linear, quadratic, power-law and nonparametric fitters
//! - [`comparison`]: cross-model R² comparison
//! - [`storage`]: snapshot CSVs, slippage tables and summaries on disk
//! - [`pipeline`]: calculate / fit / compare stages

pub mod batch;
pub mod book;
pub mod comparison;
pub mod config;
pub mod fitting;
pub mod pipeline;
pub mod storage;

pub use config::PipelineConfig;
