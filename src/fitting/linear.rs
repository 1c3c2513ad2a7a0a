//! Ordinary least squares: `slippage = slope * size + intercept`.

use super::{CurveFitter, FitError, FitParams, FittedCurve, FitterKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearFitter;

impl CurveFitter for LinearFitter {
    fn kind(&self) -> FitterKind {
        FitterKind::Linear
    }

    fn min_points(&self) -> usize {
        2
    }

    fn fit_points(&self, xs: &[f64], ys: &[f64]) -> Result<FittedCurve, FitError> {
        let n = xs.len() as f64;
        let x_mean = xs.iter().sum::<f64>() / n;
        let y_mean = ys.iter().sum::<f64>() / n;

        let (sxy, sxx) = xs.iter().zip(ys).fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
            let dx = x - x_mean;
            (sxy + dx * (y - y_mean), sxx + dx * dx)
        });
        if sxx <= 0.0 {
            return Err(FitError::Singular("all sizes identical"));
        }

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;
        let fitted = xs.iter().map(|x| slope * x + intercept).collect();

        Ok(FittedCurve {
            params: FitParams::Linear { slope, intercept },
            fitted,
        })
    }
}
