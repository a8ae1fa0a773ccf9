//! Unit-root testing.
//!
//! The augmented Dickey-Fuller test regresses `Δy_t` on a constant, the lagged level
//! `y_{t-1}` and `p` lagged differences, choosing `p` by AIC. The statistic is the
//! t-value of the lagged level; p-values follow MacKinnon's (1994) response surface for a
//! single series with a constant term.

use nalgebra::DMatrix;
use pairs_core::{Error, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::regression::LeastSquares;

/// A unit-root test producing a p-value for the null of non-stationarity.
#[cfg_attr(test, mockall::automock)]
pub trait StationarityTest {
    /// Probability of the unit-root null. Small values mean the series is stationary.
    ///
    /// Returns [`Error::StatTestInconclusive`] when no p-value can be computed.
    fn p_value(&self, series: &[f64]) -> Result<f64>;
}

/// Outcome of one ADF run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdfResult {
    pub statistic: f64,
    pub p_value: f64,
    /// Number of lagged differences in the final regression.
    pub used_lag: usize,
    /// Observations in the final regression.
    pub nobs: usize,
}

/// Augmented Dickey-Fuller test with a constant and AIC lag selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct AugmentedDickeyFuller {
    max_lag: Option<usize>,
}

impl AugmentedDickeyFuller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search lags `0..=max_lag` instead of the sample-size rule.
    pub fn with_max_lag(max_lag: Option<usize>) -> Self {
        Self { max_lag }
    }

    pub fn run(&self, series: &[f64]) -> Result<AdfResult> {
        if series.iter().any(|v| !v.is_finite()) {
            return Err(inconclusive("series contains non-finite values"));
        }

        let n = series.len();
        // Largest lag that still leaves degrees of freedom with one trend term
        let limit = (n / 2) as isize - 2;
        if limit < 0 {
            return Err(inconclusive(format!("sample of {} is too short", n)));
        }
        let limit = limit as usize;

        let max_lag = match self.max_lag {
            Some(lag) if lag > limit => {
                return Err(inconclusive(format!(
                    "max lag {} exceeds {} for a sample of {}",
                    lag, limit, n
                )));
            }
            Some(lag) => lag,
            None => {
                let rule = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
                rule.min(limit)
            }
        };

        let diff: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

        // Every candidate lag is scored on the sample that the largest lag allows
        let mut best: Option<(f64, usize)> = None;
        for lag in 0..=max_lag {
            let Some(fit) = fit_adf(series, &diff, lag, max_lag) else {
                continue;
            };
            let aic = fit.aic();
            if aic.is_nan() {
                continue;
            }
            if best.map_or(true, |(best_aic, _)| aic < best_aic) {
                best = Some((aic, lag));
            }
        }

        let (_, used_lag) = best.ok_or_else(|| inconclusive("no lag order could be fitted"))?;

        let fit = fit_adf(series, &diff, used_lag, used_lag)
            .ok_or_else(|| inconclusive("singular regression"))?;
        let statistic = fit.t_value(1);
        if !statistic.is_finite() {
            return Err(inconclusive(format!("non-finite statistic {}", statistic)));
        }

        Ok(AdfResult {
            statistic,
            p_value: mackinnon_p_value(statistic),
            used_lag,
            nobs: fit.nobs(),
        })
    }
}

impl StationarityTest for AugmentedDickeyFuller {
    fn p_value(&self, series: &[f64]) -> Result<f64> {
        self.run(series).map(|r| r.p_value)
    }
}

/// Fit `Δy_t = c + γ y_{t-1} + Σ_{i=1..lag} φ_i Δy_{t-i}` over rows `skip..diff.len()`.
///
/// Column 1 holds the lagged level.
fn fit_adf(series: &[f64], diff: &[f64], lag: usize, skip: usize) -> Option<LeastSquares> {
    let rows = diff.len().checked_sub(skip)?;
    let cols = 2 + lag;

    let design = DMatrix::from_fn(rows, cols, |r, c| {
        let t = skip + r;
        match c {
            0 => 1.0,
            1 => series[t],
            i => diff[t - (i - 1)],
        }
    });

    LeastSquares::fit(&diff[skip..], design)
}

// MacKinnon (1994) surface for one variable with a constant
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

/// Approximate asymptotic p-value of an ADF statistic.
pub fn mackinnon_p_value(statistic: f64) -> f64 {
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }

    let coefficients: &[f64] = if statistic <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };

    // Horner evaluation of c0 + c1 t + c2 t^2 + ...
    let z = coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * statistic + c);

    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(z),
        Err(_) => f64::NAN,
    }
}

fn inconclusive(reason: impl Into<String>) -> Error {
    Error::StatTestInconclusive(reason.into())
}
