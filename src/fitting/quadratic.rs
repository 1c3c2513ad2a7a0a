//! Degree-2 polynomial least squares: `slippage = a * size² + b * size + c`.
//!
//! Sizes run into the thousands, so `size²` dwarfs the constant column. The
//! Vandermonde columns are scaled to unit norm before an SVD solve and the
//! coefficients are unscaled afterwards; singular values below
//! `n * eps * σ_max` are dropped.

use super::{CurveFitter, FitError, FitParams, FittedCurve, FitterKind};
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone, Copy, Default)]
pub struct QuadraticFitter;

impl CurveFitter for QuadraticFitter {
    fn kind(&self) -> FitterKind {
        FitterKind::Quadratic
    }

    fn min_points(&self) -> usize {
        3
    }

    fn fit_points(&self, xs: &[f64], ys: &[f64]) -> Result<FittedCurve, FitError> {
        let coeffs = polyfit(xs, ys, 2)?;
        let (a, b, c) = (coeffs[0], coeffs[1], coeffs[2]);
        let fitted = xs.iter().map(|&x| polyval(&coeffs, x)).collect();

        Ok(FittedCurve {
            params: FitParams::Quadratic { a, b, c },
            fitted,
        })
    }
}

/// Horner evaluation of coefficients ordered highest degree first.
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().fold(0.0, |acc, c| acc * x + c)
}

/// Least-squares polynomial coefficients, highest degree first.
pub fn polyfit(xs: &[f64], ys: &[f64], degree: usize) -> Result<Vec<f64>, FitError> {
    let n = xs.len();
    let cols = degree + 1;
    let mut design = DMatrix::from_fn(n, cols, |i, j| xs[i].powi((degree - j) as i32));

    let mut scale = vec![1.0; cols];
    for (j, s) in scale.iter_mut().enumerate() {
        let norm = design.column(j).norm();
        if norm > 0.0 {
            *s = norm;
            design.column_mut(j).unscale_mut(norm);
        }
    }

    let rhs = DVector::from_column_slice(ys);
    let svd = design.svd(true, true);
    let sigma_max = svd.singular_values.max();
    let eps = n as f64 * f64::EPSILON * sigma_max;
    let solution = svd
        .solve(&rhs, eps)
        .map_err(|_| FitError::Singular("polynomial design matrix"))?;

    let coeffs: Vec<f64> = solution.iter().zip(&scale).map(|(v, s)| v / s).collect();
    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(FitError::NonFinite);
    }
    Ok(coeffs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::MeanSlippageCurve;

    #[test]
    fn test_linear_curve_has_vanishing_leading_coefficient() {
        let curve = MeanSlippageCurve::from_pairs("AAPL", &[(100.0, 1.0), (200.0, 1.5), (300.0, 2.0)]);
        let result = QuadraticFitter.fit(&curve).unwrap();

        match result.params {
            FitParams::Quadratic { a, b, c } => {
                assert!(a.abs() < 1e-12);
                assert!((b - 0.005).abs() < 1e-9);
                assert!((c - 0.5).abs() < 1e-6);
            }
            other => panic!("unexpected params {:?}", other),
        }
        assert!((result.r2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_recovers_exact_parabola() {
        let pairs: Vec<(f64, f64)> = (1..=20)
            .map(|i| {
                let x = i as f64 * 100.0;
                (x, 2e-7 * x * x + 1e-3 * x + 0.25)
            })
            .collect();
        let result = QuadraticFitter
            .fit(&MeanSlippageCurve::from_pairs("X", &pairs))
            .unwrap();

        match result.params {
            FitParams::Quadratic { a, b, c } => {
                assert!((a - 2e-7).abs() < 1e-15);
                assert!((b - 1e-3).abs() < 1e-10);
                assert!((c - 0.25).abs() < 1e-7);
            }
            other => panic!("unexpected params {:?}", other),
        }
        assert!((result.r2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_polyfit_degree_one_matches_ols() {
        let coeffs = polyfit(&[1.0, 2.0, 3.0, 4.0], &[3.0, 5.0, 7.0, 9.0], 1).unwrap();
        assert!((coeffs[0] - 2.0).abs() < 1e-12);
        assert!((coeffs[1] - 1.0).abs() < 1e-12);
    }
}
