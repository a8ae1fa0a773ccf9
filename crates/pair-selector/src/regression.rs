//! Ordinary least squares.

use nalgebra::{DMatrix, DVector};
use pairs_core::{Error, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::f64::consts::PI;

/// Fitted least-squares model over an arbitrary design matrix.
#[derive(Debug, Clone)]
pub(crate) struct LeastSquares {
    pub coefficients: DVector<f64>,
    pub residuals: DVector<f64>,
    pub ssr: f64,
    nobs: usize,
    cov_unscaled: DMatrix<f64>,
}

impl LeastSquares {
    /// Solve `y = X b` through the normal equations.
    ///
    /// Returns `None` for an empty, underdetermined or singular design.
    pub fn fit(y: &[f64], design: DMatrix<f64>) -> Option<Self> {
        let (nobs, k) = design.shape();
        if nobs != y.len() || nobs <= k || k == 0 {
            return None;
        }

        let y = DVector::from_column_slice(y);
        let xt = design.transpose();
        let cov_unscaled = (&xt * &design).try_inverse()?;
        let coefficients = &cov_unscaled * (&xt * &y);
        let residuals = &y - &design * &coefficients;
        let ssr = residuals.norm_squared();

        if !coefficients.iter().all(|c| c.is_finite()) {
            return None;
        }

        Some(Self {
            coefficients,
            residuals,
            ssr,
            nobs,
            cov_unscaled,
        })
    }

    pub fn nobs(&self) -> usize {
        self.nobs
    }

    pub fn k(&self) -> usize {
        self.coefficients.len()
    }

    /// Residual variance with a degrees-of-freedom correction.
    pub fn sigma2(&self) -> f64 {
        self.ssr / (self.nobs - self.k()) as f64
    }

    pub fn std_error(&self, j: usize) -> f64 {
        (self.sigma2() * self.cov_unscaled[(j, j)]).sqrt()
    }

    pub fn t_value(&self, j: usize) -> f64 {
        self.coefficients[j] / self.std_error(j)
    }

    /// Akaike information criterion under Gaussian errors.
    pub fn aic(&self) -> f64 {
        let n = self.nobs as f64;
        let half = n / 2.0;
        let llf = -half * (2.0 * PI).ln() - half * (self.ssr / n).ln() - half;
        -2.0 * llf + 2.0 * self.k() as f64
    }
}

/// Result of regressing `y` on `x` with an intercept: `y = intercept + hedge_ratio * x + e`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub intercept: f64,
    pub hedge_ratio: f64,
    pub intercept_std_error: f64,
    pub hedge_ratio_std_error: f64,
    pub r_squared: f64,
    pub nobs: usize,
    /// In-sample residuals, one per observation.
    pub residuals: Vec<f64>,
}

impl Regression {
    /// Fit the two-variable model.
    pub fn fit(y: &[f64], x: &[f64]) -> Result<Self> {
        if y.len() != x.len() {
            return Err(Error::MisalignedSeries {
                left: "y".to_string(),
                left_len: y.len(),
                right: "x".to_string(),
                right_len: x.len(),
            });
        }

        let design = DMatrix::from_fn(x.len(), 2, |i, j| if j == 0 { 1.0 } else { x[i] });
        let fit = LeastSquares::fit(y, design).ok_or_else(|| Error::DegenerateSeries {
            asset: "regression".to_string(),
            reason: format!("singular design over {} observations", x.len()),
        })?;

        let y_mean = y.iter().mean();
        let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
        let r_squared = if tss > 0.0 { 1.0 - fit.ssr / tss } else { 0.0 };

        Ok(Self {
            intercept: fit.coefficients[0],
            hedge_ratio: fit.coefficients[1],
            intercept_std_error: fit.std_error(0),
            hedge_ratio_std_error: fit.std_error(1),
            r_squared,
            nobs: fit.nobs(),
            residuals: fit.residuals.iter().copied().collect(),
        })
    }

    /// Mean of the in-sample residuals.
    pub fn residual_mean(&self) -> f64 {
        self.residuals.iter().mean()
    }

    /// Population standard deviation of the in-sample residuals.
    pub fn residual_std(&self) -> f64 {
        self.residuals.iter().population_std_dev()
    }

    /// Out-of-sample spread `y - hedge_ratio * x - intercept`.
    pub fn spread(&self, y: &[f64], x: &[f64]) -> Vec<f64> {
        y.iter()
            .zip(x)
            .map(|(yi, xi)| yi - self.hedge_ratio * xi - self.intercept)
            .collect()
    }
}
