//! LOWESS smoother evaluated at the curve's own sizes.
//!
//! Each point gets a local linear regression over its `k = ⌊frac·n⌋` nearest
//! neighbours (at least 2), weighted by the tricube of the distance scaled
//! by the farthest neighbour in the window. `iterations` robustifying passes
//! follow, multiplying in bisquare weights of `residual / (6 · median|residual|)`.

use super::{CurveFitter, FitError, FitParams, FittedCurve, FitterKind};

#[derive(Debug, Clone)]
pub struct LowessFitter {
    pub frac: f64,
    pub iterations: usize,
}

impl Default for LowessFitter {
    fn default() -> Self {
        Self {
            frac: 0.5,
            iterations: 3,
        }
    }
}

impl LowessFitter {
    pub fn new(frac: f64, iterations: usize) -> Self {
        Self { frac, iterations }
    }

    /// Neighbourhood size for `n` points.
    pub fn window(&self, n: usize) -> usize {
        ((self.frac * n as f64 + 1e-10).floor() as usize).clamp(2, n.max(2))
    }

    /// Smoothed values at `xs` (sorted ascending).
    pub fn smooth(&self, xs: &[f64], ys: &[f64]) -> Vec<f64> {
        let n = xs.len();
        let k = self.window(n).min(n);
        let mut robustness = vec![1.0; n];
        let mut fitted = vec![0.0; n];

        for pass in 0..=self.iterations {
            let mut left = 0usize;
            for i in 0..n {
                // Slide the k-wide window while the right side is closer.
                while left + k < n && xs[i] - xs[left] > xs[left + k] - xs[i] {
                    left += 1;
                }
                fitted[i] = local_fit(xs, ys, &robustness, i, left, left + k - 1);
            }

            if pass == self.iterations {
                break;
            }

            let residuals: Vec<f64> = ys.iter().zip(&fitted).map(|(y, f)| y - f).collect();
            let scale = 6.0 * median_abs(&residuals);
            if scale <= 0.0 {
                break;
            }
            for (w, r) in robustness.iter_mut().zip(&residuals) {
                *w = bisquare(r / scale);
            }
        }

        fitted
    }
}

fn local_fit(xs: &[f64], ys: &[f64], robustness: &[f64], i: usize, left: usize, right: usize) -> f64 {
    let x0 = xs[i];
    let radius = (x0 - xs[left]).max(xs[right] - x0);

    let weights: Vec<f64> = (left..=right)
        .map(|j| {
            let w = if radius > 0.0 {
                tricube((xs[j] - x0).abs() / radius)
            } else {
                1.0
            };
            w * robustness[j]
        })
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return ys[i];
    }

    let (mut x_mean, mut y_mean) = (0.0, 0.0);
    for (w, j) in weights.iter().zip(left..=right) {
        x_mean += w * xs[j] / total;
        y_mean += w * ys[j] / total;
    }

    let (mut sxx, mut sxy) = (0.0, 0.0);
    for (w, j) in weights.iter().zip(left..=right) {
        let dx = xs[j] - x_mean;
        sxx += w / total * dx * dx;
        sxy += w / total * dx * (ys[j] - y_mean);
    }

    let tiny = 1e-12 * if radius > 0.0 { radius * radius } else { 1.0 };
    if sxx > tiny {
        y_mean + sxy / sxx * (x0 - x_mean)
    } else {
        y_mean
    }
}

fn tricube(u: f64) -> f64 {
    if u < 1.0 {
        (1.0 - u.powi(3)).powi(3)
    } else {
        0.0
    }
}

fn bisquare(u: f64) -> f64 {
    if u.abs() < 1.0 {
        (1.0 - u * u).powi(2)
    } else {
        0.0
    }
}

fn median_abs(values: &[f64]) -> f64 {
    let mut abs: Vec<f64> = values.iter().map(|v| v.abs()).collect();
    abs.sort_by(|a, b| a.total_cmp(b));
    let n = abs.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => abs[n / 2],
        _ => 0.5 * (abs[n / 2 - 1] + abs[n / 2]),
    }
}

impl CurveFitter for LowessFitter {
    fn kind(&self) -> FitterKind {
        FitterKind::Lowess
    }

    fn min_points(&self) -> usize {
        3
    }

    fn fit_points(&self, xs: &[f64], ys: &[f64]) -> Result<FittedCurve, FitError> {
        Ok(FittedCurve {
            params: FitParams::Lowess {
                frac: self.frac,
                iterations: self.iterations,
            },
            fitted: self.smooth(xs, ys),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::MeanSlippageCurve;

    fn sizes() -> Vec<f64> {
        (1..=20).map(|i| i as f64 * 100.0).collect()
    }

    #[test]
    fn test_window_size() {
        let fitter = LowessFitter::default();
        assert_eq!(fitter.window(20), 10);
        assert_eq!(fitter.window(3), 2);
        assert_eq!(LowessFitter::new(1.0, 0).window(7), 7);
    }

    #[test]
    fn test_reproduces_a_line() {
        let pairs: Vec<(f64, f64)> = sizes().into_iter().map(|x| (x, 0.005 * x + 0.5)).collect();
        let result = LowessFitter::default()
            .fit(&MeanSlippageCurve::from_pairs("X", &pairs))
            .unwrap();
        for (f, (_, y)) in result.fitted.iter().zip(&pairs) {
            assert!((f - y).abs() < 1e-9);
        }
        assert!((result.r2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_three_points_are_reproduced() {
        let curve = MeanSlippageCurve::from_pairs("AAPL", &[(100.0, 1.0), (200.0, 1.5), (300.0, 2.0)]);
        let result = LowessFitter::default().fit(&curve).unwrap();
        assert!((result.r2 - 1.0).abs() < 1e-12);
        assert_eq!(result.params, FitParams::Lowess { frac: 0.5, iterations: 3 });
    }

    #[test]
    fn test_robust_passes_downweight_outlier() {
        let xs = sizes();
        let line = |x: f64| 0.002 * x + 0.1;
        let mut ys: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| line(x) + 0.05 * (i as f64 * 1.7).sin())
            .collect();
        ys[10] += 5.0;

        let worst = |fitted: &[f64]| {
            [8, 9, 11, 12]
                .iter()
                .map(|&j| (fitted[j] - line(xs[j])).abs())
                .fold(0.0, f64::max)
        };
        let plain = LowessFitter::new(0.5, 0).smooth(&xs, &ys);
        let robust = LowessFitter::new(0.5, 3).smooth(&xs, &ys);
        assert!(worst(&plain) > 0.5);
        assert!(worst(&robust) < 0.1);
    }

    #[test]
    fn test_noisy_curve_scores_high() {
        let xs = sizes();
        let ys: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| 0.002 * x + 0.1 + 0.05 * (i as f64 * 1.7).sin())
            .collect();
        let fitted = LowessFitter::default().smooth(&xs, &ys);
        let r2 = crate::fitting::r_squared(&ys, &fitted);
        assert!(r2 > 0.99 && r2 < 1.0);
    }

    #[test]
    fn test_two_points_insufficient() {
        let curve = MeanSlippageCurve::from_pairs("X", &[(100.0, 1.0), (200.0, 1.5)]);
        assert!(matches!(
            LowessFitter::default().fit(&curve),
            Err(FitError::InsufficientData { required: 3, .. })
        ));
    }
}
