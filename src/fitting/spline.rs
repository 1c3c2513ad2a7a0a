//! Cubic smoothing spline evaluated at the curve's own sizes.
//!
//! Reinsch form: with sizes rescaled to `[0, 1]`, knot gaps `h`, the
//! second-difference operator `Q` (n × n-2) and the tridiagonal band `R`
//! ((n-2) × (n-2)), the smoothed values for a roughness weight `λ` are
//!
//! ```text
//! (R + λ QᵀQ) γ = Qᵀy,    g = y - λ Q γ
//! ```
//!
//! With no interior knots a cubic spline is a single cubic polynomial, so
//! when the least-squares cubic already has a residual sum of squares within
//! the smoothing factor `s`, that cubic is returned (reported with an
//! infinite weight). Otherwise the residual, which grows monotonically with
//! `λ` up to the straight-line residual, is brought to `s` by bisection on
//! `log10 λ`.

use super::quadratic::{polyfit, polyval};
use super::{CurveFitter, FitError, FitParams, FittedCurve, FitterKind};
use nalgebra::{DMatrix, DVector};

const LOG_WEIGHT_MIN: f64 = -12.0;
const LOG_WEIGHT_MAX: f64 = 12.0;
const MAX_BISECTIONS: usize = 200;

#[derive(Debug, Clone)]
pub struct SplineFitter {
    /// Target residual sum of squares.
    pub smoothing: f64,
}

impl Default for SplineFitter {
    fn default() -> Self {
        Self { smoothing: 1.0 }
    }
}

impl SplineFitter {
    pub fn new(smoothing: f64) -> Self {
        Self { smoothing }
    }
}

/// Precomputed Reinsch system for one set of points.
struct ReinschSystem {
    q: DMatrix<f64>,
    r: DMatrix<f64>,
    qtq: DMatrix<f64>,
    qty: DVector<f64>,
    y: DVector<f64>,
}

impl ReinschSystem {
    fn new(xs: &[f64], ys: &[f64]) -> Result<Self, FitError> {
        let n = xs.len();
        let span = xs[n - 1] - xs[0];
        if span <= 0.0 {
            return Err(FitError::Singular("sizes span no range"));
        }
        let h: Vec<f64> = xs.windows(2).map(|w| (w[1] - w[0]) / span).collect();
        if h.iter().any(|&gap| gap <= 0.0) {
            return Err(FitError::Singular("repeated sizes"));
        }

        let m = n - 2;
        let mut q = DMatrix::zeros(n, m);
        let mut r = DMatrix::zeros(m, m);
        for j in 0..m {
            q[(j, j)] = 1.0 / h[j];
            q[(j + 1, j)] = -1.0 / h[j] - 1.0 / h[j + 1];
            q[(j + 2, j)] = 1.0 / h[j + 1];

            r[(j, j)] = (h[j] + h[j + 1]) / 3.0;
            if j + 1 < m {
                r[(j, j + 1)] = h[j + 1] / 6.0;
                r[(j + 1, j)] = h[j + 1] / 6.0;
            }
        }

        let y = DVector::from_column_slice(ys);
        let qtq = q.transpose() * &q;
        let qty = q.transpose() * &y;
        Ok(Self { q, r, qtq, qty, y })
    }

    fn smoothed(&self, weight: f64) -> Result<DVector<f64>, FitError> {
        let system = &self.r + &self.qtq * weight;
        let gamma = system
            .cholesky()
            .map(|c| c.solve(&self.qty))
            .ok_or(FitError::Singular("spline normal equations"))?;
        Ok(&self.y - (&self.q * gamma) * weight)
    }

    fn residual(&self, fitted: &DVector<f64>) -> f64 {
        (&self.y - fitted).norm_squared()
    }
}

impl CurveFitter for SplineFitter {
    fn kind(&self) -> FitterKind {
        FitterKind::Spline
    }

    fn min_points(&self) -> usize {
        4
    }

    fn fit_points(&self, xs: &[f64], ys: &[f64]) -> Result<FittedCurve, FitError> {
        let s = self.smoothing;

        let coeffs = polyfit(xs, ys, 3)?;
        let cubic: Vec<f64> = xs.iter().map(|&x| polyval(&coeffs, x)).collect();
        let cubic_residual: f64 = ys.iter().zip(&cubic).map(|(y, f)| (y - f).powi(2)).sum();
        if cubic_residual <= s {
            return Ok(FittedCurve {
                params: FitParams::Spline {
                    smoothing: s,
                    weight: f64::INFINITY,
                },
                fitted: cubic,
            });
        }

        let system = ReinschSystem::new(xs, ys)?;
        let (mut lo, mut hi) = (LOG_WEIGHT_MIN, LOG_WEIGHT_MAX);
        let mut best = system.smoothed(10f64.powf(lo))?;

        if system.residual(&best) <= s {
            for _ in 0..MAX_BISECTIONS {
                if hi - lo < 1e-10 {
                    break;
                }
                let mid = 0.5 * (lo + hi);
                let candidate = system.smoothed(10f64.powf(mid))?;
                if system.residual(&candidate) > s {
                    hi = mid;
                } else {
                    lo = mid;
                    best = candidate;
                }
            }
        }

        Ok(FittedCurve {
            params: FitParams::Spline {
                smoothing: s,
                weight: 10f64.powf(lo),
            },
            fitted: best.iter().copied().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::MeanSlippageCurve;
    use crate::fitting::{r_squared, LinearFitter};

    fn curve(f: impl Fn(f64) -> f64) -> MeanSlippageCurve {
        let pairs: Vec<(f64, f64)> = (1..=20)
            .map(|i| {
                let x = i as f64 * 100.0;
                (x, f(x))
            })
            .collect();
        MeanSlippageCurve::from_pairs("X", &pairs)
    }

    fn residual(result: &crate::fitting::FitResult, curve: &MeanSlippageCurve) -> f64 {
        curve
            .ys()
            .iter()
            .zip(&result.fitted)
            .map(|(y, f)| (y - f).powi(2))
            .sum()
    }

    #[test]
    fn test_linear_data_returns_exact_fit() {
        let result = SplineFitter::default().fit(&curve(|x| 0.005 * x + 0.5)).unwrap();
        assert!((result.r2 - 1.0).abs() < 1e-12);
        match result.params {
            FitParams::Spline { smoothing, weight } => {
                assert_eq!(smoothing, 1.0);
                assert!(weight.is_infinite());
            }
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_loose_smoothing_returns_least_squares_cubic() {
        let data = curve(|x| 0.01 * x.sqrt());
        let result = SplineFitter::default().fit(&data).unwrap();
        let line = LinearFitter.fit(&data).unwrap();

        let coeffs = polyfit(&data.xs(), &data.ys(), 3).unwrap();
        let cubic: Vec<f64> = data.xs().iter().map(|&x| polyval(&coeffs, x)).collect();
        let cubic_r2 = r_squared(&data.ys(), &cubic);

        assert!((result.r2 - cubic_r2).abs() < 1e-12);
        assert!((result.r2 - 0.999443).abs() < 1e-5);
        assert!(result.r2 > line.r2 + 0.02);
        match result.params {
            FitParams::Spline { weight, .. } => assert!(weight.is_infinite()),
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_residual_matches_smoothing_factor() {
        let data = curve(|x| 10.0 * x.sqrt());
        let result = SplineFitter::new(1.0).fit(&data).unwrap();
        assert!((residual(&result, &data) - 1.0).abs() < 1e-6);
        assert!(result.r2 > 0.9999 && result.r2 < 1.0);
        match result.params {
            FitParams::Spline { weight, .. } => assert!(weight.is_finite() && weight > 0.0),
            other => panic!("unexpected params {:?}", other),
        }
    }

    #[test]
    fn test_small_smoothing_tracks_curve() {
        let data = curve(|x| 0.02 * x.powf(0.6) + 0.5);
        let loose = SplineFitter::new(1.0).fit(&data).unwrap();
        let tight = SplineFitter::new(1e-6).fit(&data).unwrap();
        assert!(tight.r2 > loose.r2);
        assert!(tight.r2 > 0.99999);
        assert!(residual(&tight, &data) <= 1e-6 * (1.0 + 1e-6));
    }

    #[test]
    fn test_zero_smoothing_interpolates() {
        let data = curve(|x| 0.02 * x.powf(0.6) + 0.5 + if x as i64 % 300 == 0 { 0.05 } else { 0.0 });
        let result = SplineFitter::new(0.0).fit(&data).unwrap();
        assert!(residual(&result, &data) < 1e-10);
    }

    #[test]
    fn test_three_points_insufficient() {
        let data = MeanSlippageCurve::from_pairs("AAPL", &[(100.0, 1.0), (200.0, 1.5), (300.0, 2.0)]);
        assert_eq!(
            SplineFitter::default().fit(&data),
            Err(FitError::InsufficientData {
                required: 4,
                available: 3
            })
        );
    }
}
