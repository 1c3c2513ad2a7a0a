//! Curve Fitters
//!
//! Four independent strategies turn one instrument's [`MeanSlippageCurve`]
//! into fitted parameters plus an in-sample R²:
//!
//! | Strategy        | Fitter(s)            | Model                         |
//! |-----------------|----------------------|-------------------------------|
//! | `linear`        | [`LinearFitter`]     | `slope * x + intercept`       |
//! | `quadratic`     | [`QuadraticFitter`]  | `a * x² + b * x + c`          |
//! | `parametric`    | [`PowerLawFitter`]   | `a * x^b + c`                 |
//! | `nonparametric` | [`LowessFitter`], [`SplineFitter`] | local smoothers |
//!
//! Every fitter reads the curve and never mutates it. Fitters share no state
//! and can run in any order or concurrently.
//!
//! Failures are values: too few distinct sizes is
//! [`FitError::InsufficientData`], a power-law run that does not settle is
//! [`FitError::Convergence`]. Callers log and skip the (instrument, fitter)
//! pair.

pub mod linear;
pub mod lowess;
pub mod power_law;
pub mod quadratic;
pub mod spline;

pub use linear::LinearFitter;
pub use lowess::LowessFitter;
pub use power_law::PowerLawFitter;
pub use quadratic::QuadraticFitter;
pub use spline::SplineFitter;

use crate::batch::MeanSlippageCurve;
use crate::config::FittingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// ERRORS
// =============================================================================

/// Why a fitter produced no result for an instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// Fewer distinct sizes than the model needs.
    InsufficientData { required: usize, available: usize },
    /// Iterative optimizer hit its evaluation cap.
    Convergence { evaluations: usize, reason: String },
    /// Linear system could not be solved.
    Singular(&'static str),
    /// Parameters or fitted values are NaN/inf.
    NonFinite,
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData {
                required,
                available,
            } => write!(
                f,
                "insufficient data: need {} distinct sizes, have {}",
                required, available
            ),
            Self::Convergence {
                evaluations,
                reason,
            } => write!(f, "no convergence after {} evaluations: {}", evaluations, reason),
            Self::Singular(what) => write!(f, "singular system: {}", what),
            Self::NonFinite => write!(f, "fit produced non-finite values"),
        }
    }
}

impl std::error::Error for FitError {}

// =============================================================================
// FITTER IDENTITY
// =============================================================================

/// Identity of a single fitter, as it appears in the comparison tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitterKind {
    Parametric,
    Linear,
    Quadratic,
    Lowess,
    Spline,
}

impl FitterKind {
    pub const ALL: [FitterKind; 5] = [
        FitterKind::Parametric,
        FitterKind::Linear,
        FitterKind::Quadratic,
        FitterKind::Lowess,
        FitterKind::Spline,
    ];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parametric => "parametric",
            Self::Linear => "linear",
            Self::Quadratic => "quadratic",
            Self::Lowess => "lowess",
            Self::Spline => "spline",
        }
    }

    /// Label used in the `method` column of the nonparametric summary.
    pub fn method_label(&self) -> &'static str {
        match self {
            Self::Parametric => "Parametric",
            Self::Linear => "Linear",
            Self::Quadratic => "Quadratic",
            Self::Lowess => "LOWESS",
            Self::Spline => "Spline",
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Parametric => Strategy::Parametric,
            Self::Linear => Strategy::Linear,
            Self::Quadratic => Strategy::Quadratic,
            Self::Lowess | Self::Spline => Strategy::Nonparametric,
        }
    }
}

impl fmt::Display for FitterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_model_name(s).ok_or_else(|| format!("unknown model name: {}", s))
    }
}

/// Map casing and spelling variants of a model name onto a [`FitterKind`].
///
/// `LOWESS`, `Lowess`, `loess` -> lowess; `Spline`, `smoothing_spline` ->
/// spline; `power_law`, `power-law`, `Parametric` -> parametric.
pub fn normalize_model_name(name: &str) -> Option<FitterKind> {
    let key: String = name
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    match key.as_str() {
        "parametric" | "powerlaw" | "power" => Some(FitterKind::Parametric),
        "linear" | "ols" => Some(FitterKind::Linear),
        "quadratic" | "poly2" => Some(FitterKind::Quadratic),
        "lowess" | "loess" => Some(FitterKind::Lowess),
        "spline" | "smoothingspline" | "univariatespline" => Some(FitterKind::Spline),
        _ => None,
    }
}

/// A fitting strategy: one summary file, one or more fitters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Linear,
    Quadratic,
    Parametric,
    Nonparametric,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Linear,
        Strategy::Quadratic,
        Strategy::Parametric,
        Strategy::Nonparametric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Quadratic => "quadratic",
            Self::Parametric => "parametric",
            Self::Nonparametric => "nonparametric",
        }
    }

    /// Fitters run under this strategy.
    pub fn kinds(&self) -> &'static [FitterKind] {
        match self {
            Self::Linear => &[FitterKind::Linear],
            Self::Quadratic => &[FitterKind::Quadratic],
            Self::Parametric => &[FitterKind::Parametric],
            Self::Nonparametric => &[FitterKind::Lowess, FitterKind::Spline],
        }
    }

    /// `slippage_<strategy>_summary.csv`
    pub fn summary_file_name(&self) -> String {
        format!("slippage_{}_summary.csv", self.as_str())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "quadratic" => Ok(Self::Quadratic),
            "parametric" | "power_law" | "power-law" => Ok(Self::Parametric),
            "nonparametric" | "non-parametric" => Ok(Self::Nonparametric),
            other => Err(format!("unknown strategy: {}", other)),
        }
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// Strategy-specific fitted parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum FitParams {
    Linear {
        slope: f64,
        intercept: f64,
    },
    /// Highest degree first.
    Quadratic {
        a: f64,
        b: f64,
        c: f64,
    },
    PowerLaw {
        a: f64,
        b: f64,
        c: f64,
        evaluations: usize,
    },
    Lowess {
        frac: f64,
        iterations: usize,
    },
    /// `weight` is the solved roughness penalty in unit-x coordinates;
    /// infinite when the straight-line limit already meets `smoothing`.
    Spline {
        smoothing: f64,
        weight: f64,
    },
}

/// One fitter applied to one instrument's curve. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub instrument: String,
    pub kind: FitterKind,
    pub params: FitParams,
    pub r2: f64,
    /// Fitted values at the curve's sizes.
    pub fitted: Vec<f64>,
    pub n_points: usize,
}

/// Parameters and fitted values produced by a fitter, before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedCurve {
    pub params: FitParams,
    pub fitted: Vec<f64>,
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// A constant target scores 1.0 when reproduced exactly and 0.0 otherwise.
pub fn r_squared(observed: &[f64], fitted: &[f64]) -> f64 {
    let n = observed.len().min(fitted.len());
    if n == 0 {
        return f64::NAN;
    }
    let mean = observed[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = observed[..n].iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = observed[..n]
        .iter()
        .zip(&fitted[..n])
        .map(|(y, f)| (y - f).powi(2))
        .sum();

    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

// =============================================================================
// FITTER TRAIT
// =============================================================================

/// A curve-fitting strategy over `(size, mean slippage)` points.
pub trait CurveFitter: Send + Sync {
    fn kind(&self) -> FitterKind;

    /// Distinct sizes required.
    fn min_points(&self) -> usize;

    /// Fit sorted, finite points. `xs.len() >= min_points()` is guaranteed.
    fn fit_points(&self, xs: &[f64], ys: &[f64]) -> Result<FittedCurve, FitError>;

    /// Fit a mean slippage curve and score it in-sample.
    fn fit(&self, curve: &MeanSlippageCurve) -> Result<FitResult, FitError> {
        let xs = curve.xs();
        let ys = curve.ys();
        if xs.iter().chain(&ys).any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite);
        }
        require_points(curve.distinct_sizes(), self.min_points())?;

        let FittedCurve { params, fitted } = self.fit_points(&xs, &ys)?;
        if fitted.len() != ys.len() || fitted.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite);
        }

        Ok(FitResult {
            instrument: curve.instrument.clone(),
            kind: self.kind(),
            params,
            r2: r_squared(&ys, &fitted),
            fitted,
            n_points: xs.len(),
        })
    }
}

pub(crate) fn require_points(available: usize, required: usize) -> Result<(), FitError> {
    if available < required {
        Err(FitError::InsufficientData {
            required,
            available,
        })
    } else {
        Ok(())
    }
}

/// Build the fitter for `kind` from configuration.
pub fn fitter_for(kind: FitterKind, config: &FittingConfig) -> Box<dyn CurveFitter> {
    match kind {
        FitterKind::Linear => Box::new(LinearFitter),
        FitterKind::Quadratic => Box::new(QuadraticFitter),
        FitterKind::Parametric => Box::new(PowerLawFitter::from_config(config)),
        FitterKind::Lowess => Box::new(LowessFitter::new(config.lowess_frac, config.lowess_iterations)),
        FitterKind::Spline => Box::new(SplineFitter::new(config.spline_smoothing)),
    }
}

/// Fitters for a set of strategies, in strategy order.
pub fn fitters_for(strategies: &[Strategy], config: &FittingConfig) -> Vec<Box<dyn CurveFitter>> {
    strategies
        .iter()
        .flat_map(|s| s.kinds().iter())
        .map(|&kind| fitter_for(kind, config))
        .collect()
}

// =============================================================================
// RESULTS BUILDER
// =============================================================================

/// Append-only collection of fit results.
///
/// The builder owns the growing list; results are never mutated after
/// insertion and come back out in insertion order from [`finish`].
///
/// [`finish`]: FitResultsBuilder::finish
#[derive(Debug, Default)]
pub struct FitResultsBuilder {
    results: Vec<FitResult>,
}

impl FitResultsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            results: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, result: FitResult) {
        self.results.push(result);
    }

    pub fn extend<I: IntoIterator<Item = FitResult>>(&mut self, results: I) {
        self.results.extend(results);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn finish(self) -> Vec<FitResult> {
        self.results
    }
}
