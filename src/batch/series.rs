//! Instrument slippage series and the mean slippage curve derived from it.

use super::processor::SlippageRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// All slippage observations for one instrument, indexed by (row id, size).
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSlippageSeries {
    instrument: String,
    sizes: Vec<f64>,
    records: Vec<SlippageRecord>,
    by_row: HashMap<u64, usize>,
}

impl InstrumentSlippageSeries {
    /// Records must be aligned with `sizes`; rows of a different width are
    /// padded or cut to fit.
    pub fn new(instrument: impl Into<String>, sizes: Vec<f64>, mut records: Vec<SlippageRecord>) -> Self {
        for record in &mut records {
            record.slippage.resize(sizes.len(), None);
        }
        let by_row = records
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.row_id, idx))
            .collect();
        Self {
            instrument: instrument.into(),
            sizes,
            records,
            by_row,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn sizes(&self) -> &[f64] {
        &self.sizes
    }

    pub fn records(&self) -> &[SlippageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Slippage for `(row_id, size)`; `None` if unknown or undefined.
    pub fn get(&self, row_id: u64, size: f64) -> Option<f64> {
        let col = self.sizes.iter().position(|&s| s == size)?;
        let idx = *self.by_row.get(&row_id)?;
        self.records[idx].slippage[col]
    }

    /// Defined observations per size column.
    pub fn defined_counts(&self) -> Vec<usize> {
        (0..self.sizes.len())
            .map(|col| self.records.iter().filter(|r| r.slippage[col].is_some()).count())
            .collect()
    }

    /// Mean over snapshots, grouped by size. Sizes with no defined
    /// observation are left out of the curve and listed in `undefined_sizes`.
    pub fn mean_curve(&self) -> MeanSlippageCurve {
        let mut points = Vec::with_capacity(self.sizes.len());
        let mut undefined_sizes = Vec::new();

        for (col, &size) in self.sizes.iter().enumerate() {
            let (sum, count) = self
                .records
                .iter()
                .filter_map(|r| r.slippage[col])
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            if count == 0 {
                undefined_sizes.push(size);
            } else {
                points.push(CurvePoint {
                    size,
                    mean_slippage: sum / count as f64,
                    observations: count,
                });
            }
        }

        MeanSlippageCurve {
            instrument: self.instrument.clone(),
            points,
            undefined_sizes,
        }
    }
}

/// One `(size, mean slippage)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub size: f64,
    pub mean_slippage: f64,
    /// Snapshots that contributed to the mean.
    pub observations: usize,
}

/// Mean slippage per order size for one instrument, ascending by size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanSlippageCurve {
    pub instrument: String,
    pub points: Vec<CurvePoint>,
    /// Configured sizes with no defined observation.
    pub undefined_sizes: Vec<f64>,
}

impl MeanSlippageCurve {
    /// Build directly from `(size, mean)` pairs, sorted by size.
    pub fn from_pairs(instrument: impl Into<String>, pairs: &[(f64, f64)]) -> Self {
        let mut points: Vec<CurvePoint> = pairs
            .iter()
            .map(|&(size, mean_slippage)| CurvePoint {
                size,
                mean_slippage,
                observations: 1,
            })
            .collect();
        points.sort_by(|a, b| a.size.partial_cmp(&b.size).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            instrument: instrument.into(),
            points,
            undefined_sizes: Vec::new(),
        }
    }

    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.size).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mean_slippage).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of distinct sizes on the curve.
    pub fn distinct_sizes(&self) -> usize {
        let mut xs = self.xs();
        xs.dedup();
        xs.len()
    }
}
