//! Power-Law Fitter
//!
//! Nonlinear least squares on `slippage = a * size^b + c` with a
//! Levenberg–Marquardt iteration.
//!
//! # Iteration
//!
//! With residuals `r = y - f(p)` and Jacobian columns
//! `[x^b, a * x^b * ln x, 1]`, each step solves
//!
//! ```text
//! (JᵀJ + λ·diag(D)) δ = Jᵀr
//! ```
//!
//! where `D` holds the running maximum of the diagonal of `JᵀJ`. Because `b`
//! is unconstrained, the columns can differ by many orders of magnitude and
//! that scaling keeps the damping meaningful per parameter.
//!
//! A trial point that lowers the cost is accepted and `λ` shrinks tenfold;
//! otherwise `λ` grows tenfold and the step is retried. Trial points whose
//! residuals overflow count as infinite cost.
//!
//! # Stopping
//!
//! - Converged when both the actual and the predicted relative cost reduction
//!   fall below `ftol`, or the scaled step falls below `xtol`.
//! - Converged when `λ` saturates without finding a lower cost (no descent
//!   direction left at machine precision).
//! - [`FitError::Convergence`] once the model has been evaluated
//!   `max_evaluations` times.

use super::{CurveFitter, FitError, FitParams, FittedCurve, FitterKind};
use crate::config::FittingConfig;
use nalgebra::{Matrix3, Vector3};

/// Relative tolerance on cost reduction and on step length.
pub const DEFAULT_TOLERANCE: f64 = 1.49012e-8;

const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-15;
const MAX_DAMPING: f64 = 1e16;

#[derive(Debug, Clone)]
pub struct PowerLawFitter {
    pub initial: [f64; 3],
    pub max_evaluations: usize,
    pub ftol: f64,
    pub xtol: f64,
}

impl Default for PowerLawFitter {
    fn default() -> Self {
        Self {
            initial: [1.0, 1.0, 1.0],
            max_evaluations: 10_000,
            ftol: DEFAULT_TOLERANCE,
            xtol: DEFAULT_TOLERANCE,
        }
    }
}

/// Outcome of a successful optimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerLawSolution {
    pub params: Vector3<f64>,
    pub evaluations: usize,
}

impl PowerLawFitter {
    pub fn from_config(config: &FittingConfig) -> Self {
        Self {
            initial: config.power_law_initial,
            max_evaluations: config.power_law_max_evaluations,
            ..Self::default()
        }
    }

    /// `a * x^b + c`
    pub fn evaluate(params: &Vector3<f64>, x: f64) -> f64 {
        params[0] * x.powf(params[1]) + params[2]
    }

    /// Residuals `y - f(x)`, or `None` if any is non-finite.
    fn residuals(params: &Vector3<f64>, xs: &[f64], ys: &[f64]) -> Option<Vec<f64>> {
        let r: Vec<f64> = xs
            .iter()
            .zip(ys)
            .map(|(&x, &y)| y - Self::evaluate(params, x))
            .collect();
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    /// Normal matrix `JᵀJ` and gradient `Jᵀr` at `params`.
    fn normal_equations(params: &Vector3<f64>, xs: &[f64], r: &[f64]) -> (Matrix3<f64>, Vector3<f64>) {
        let mut jtj = Matrix3::zeros();
        let mut jtr = Vector3::zeros();
        for (&x, &ri) in xs.iter().zip(r) {
            let xb = x.powf(params[1]);
            let row = Vector3::new(xb, params[0] * xb * x.ln(), 1.0);
            jtj += row * row.transpose();
            jtr += row * ri;
        }
        (jtj, jtr)
    }

    pub fn solve(&self, xs: &[f64], ys: &[f64]) -> Result<PowerLawSolution, FitError> {
        let mut p = Vector3::from(self.initial);
        let mut r = Self::residuals(&p, xs, ys).ok_or_else(|| FitError::Convergence {
            evaluations: 1,
            reason: "non-finite residuals at initial guess".to_string(),
        })?;
        let mut cost: f64 = r.iter().map(|v| v * v).sum();
        let mut evaluations = 1usize;
        let mut lambda = INITIAL_DAMPING;
        let mut diag = Vector3::<f64>::zeros();

        loop {
            if cost == 0.0 {
                return Ok(PowerLawSolution {
                    params: p,
                    evaluations,
                });
            }

            let (jtj, jtr) = Self::normal_equations(&p, xs, &r);
            if jtj.iter().chain(jtr.iter()).any(|v| !v.is_finite()) {
                return Err(FitError::NonFinite);
            }
            for i in 0..3 {
                diag[i] = diag[i].max(jtj[(i, i)]).max(1e-300);
            }

            // Inner loop: raise damping until a trial point lowers the cost.
            loop {
                if evaluations >= self.max_evaluations {
                    return Err(FitError::Convergence {
                        evaluations,
                        reason: format!("evaluation cap {} reached", self.max_evaluations),
                    });
                }

                let damped = jtj + Matrix3::from_diagonal(&(diag * lambda));
                let delta = match damped.lu().solve(&jtr) {
                    Some(d) if d.iter().all(|v| v.is_finite()) => d,
                    _ => {
                        lambda *= 10.0;
                        if lambda > MAX_DAMPING {
                            return Err(FitError::Singular("damped normal equations"));
                        }
                        continue;
                    }
                };

                let trial = p + delta;
                let trial_r = Self::residuals(&trial, xs, ys);
                evaluations += 1;
                let trial_cost = trial_r
                    .as_ref()
                    .map(|r| r.iter().map(|v| v * v).sum::<f64>())
                    .unwrap_or(f64::INFINITY);

                if trial_cost < cost {
                    let actual = (cost - trial_cost) / cost;
                    let scaled_delta = delta.component_mul(&delta).dot(&diag);
                    let predicted = (delta.dot(&(jtj * delta)) + 2.0 * lambda * scaled_delta) / cost;
                    let step = scaled_delta.sqrt()
                        / (p.component_mul(&p).dot(&diag).sqrt() + 1e-300);

                    p = trial;
                    cost = trial_cost;
                    if let Some(trial_r) = trial_r {
                        r = trial_r;
                    }
                    lambda = (lambda / 10.0).max(MIN_DAMPING);

                    if (actual <= self.ftol && predicted <= self.ftol) || step <= self.xtol {
                        return Ok(PowerLawSolution {
                            params: p,
                            evaluations,
                        });
                    }
                    break;
                }

                lambda *= 10.0;
                if lambda > MAX_DAMPING {
                    return Ok(PowerLawSolution {
                        params: p,
                        evaluations,
                    });
                }
            }
        }
    }
}

impl CurveFitter for PowerLawFitter {
    fn kind(&self) -> FitterKind {
        FitterKind::Parametric
    }

    fn min_points(&self) -> usize {
        3
    }

    fn fit_points(&self, xs: &[f64], ys: &[f64]) -> Result<FittedCurve, FitError> {
        let solution = self.solve(xs, ys)?;
        let p = solution.params;
        if p.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite);
        }
        let fitted = xs.iter().map(|&x| Self::evaluate(&p, x)).collect();

        Ok(FittedCurve {
            params: FitParams::PowerLaw {
                a: p[0],
                b: p[1],
                c: p[2],
                evaluations: solution.evaluations,
            },
            fitted,
        })
    }
}
