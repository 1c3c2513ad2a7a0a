//! Model Comparator
//!
//! Stacks fit results from every strategy into one `(ticker, model, r2)`
//! record set and summarizes R² per model across instruments.
//!
//! Model names coming from summary files are normalized to the canonical
//! lowercase names (`parametric`, `linear`, `quadratic`, `lowess`, `spline`),
//! so `LOWESS`, `Spline` and `power_law` all land in the right group. A model
//! with no result for some instrument simply has fewer rows.

use crate::fitting::{normalize_model_name, FitResult, FitterKind};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use tracing::warn;

/// One `(instrument, fitter, R²)` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub ticker: String,
    pub model: FitterKind,
    pub r2: f64,
}

/// R² statistics for one model across instruments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct R2Summary {
    pub model: FitterKind,
    pub mean: f64,
    /// Sample standard deviation; `None` below two observations.
    pub std: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ModelComparator {
    rows: Vec<ComparisonRow>,
}

impl ModelComparator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack in-process fit results.
    pub fn add_results(&mut self, results: &[FitResult]) {
        for result in results {
            self.push(ComparisonRow {
                ticker: result.instrument.clone(),
                model: result.kind,
                r2: result.r2,
            });
        }
    }

    /// Add a row whose model name comes from an external source. Returns
    /// `false` when the name is not recognized.
    pub fn add_named(&mut self, ticker: &str, model_name: &str, r2: f64) -> bool {
        match normalize_model_name(model_name) {
            Some(model) => {
                self.push(ComparisonRow {
                    ticker: ticker.to_string(),
                    model,
                    r2,
                });
                true
            }
            None => {
                warn!(ticker = %ticker, model = %model_name, "Unrecognized model name, row skipped");
                false
            }
        }
    }

    fn push(&mut self, row: ComparisonRow) {
        if !row.r2.is_finite() {
            warn!(ticker = %row.ticker, model = %row.model, r2 = row.r2, "Non-finite R², row skipped");
            return;
        }
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Per-model R² statistics, ordered by model name.
    pub fn summarize(&self) -> Vec<R2Summary> {
        let mut groups: BTreeMap<&'static str, (FitterKind, Vec<f64>)> = BTreeMap::new();
        for row in &self.rows {
            groups
                .entry(row.model.as_str())
                .or_insert_with(|| (row.model, Vec::new()))
                .1
                .push(row.r2);
        }

        groups
            .into_values()
            .map(|(model, r2s)| {
                let count = r2s.len();
                let std = if count >= 2 {
                    Some(Statistics::std_dev(r2s.iter()))
                } else {
                    None
                };
                R2Summary {
                    model,
                    mean: Statistics::mean(r2s.iter()),
                    std,
                    min: Statistics::min(r2s.iter()),
                    max: Statistics::max(r2s.iter()),
                    count,
                }
            })
            .collect()
    }

    /// Model with the highest mean R², if any.
    pub fn best_model(&self) -> Option<R2Summary> {
        self.summarize()
            .into_iter()
            .max_by(|a, b| a.mean.total_cmp(&b.mean))
    }
}
