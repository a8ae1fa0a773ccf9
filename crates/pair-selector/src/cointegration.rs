//! Engle-Granger style cointegration filter.
//!
//! A ranked pair survives only if both legs look like I(1) processes and the residual of
//! `y = intercept + hedge_ratio * x` is stationary. The gates run in order and stop at the
//! first failure:
//!
//! 1. levels: both p-values `>= significance` (unit root not rejected)
//! 2. first differences: both p-values `< significance`
//! 3. OLS fit of the high asset on the low asset
//! 4. residuals: p-value `< significance`

use pairs_core::config::SelectionConfig;
use pairs_core::{CandidatePair, Error, PriceTable, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use tracing::{debug, info, warn};

use crate::regression::Regression;
use crate::stationarity::{AugmentedDickeyFuller, StationarityTest};

/// Which leg of the pair a gate decision refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    High,
    Low,
}

/// Stage of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    Levels,
    Differences,
    Residuals,
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Levels => write!(f, "levels"),
            Gate::Differences => write!(f, "differences"),
            Gate::Residuals => write!(f, "residuals"),
        }
    }
}

/// Why a pair failed the filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Rejection {
    /// A leg is already stationary in levels.
    StationaryLevels { leg: Leg, p_value: f64 },
    /// A leg is not stationary after differencing once.
    NonStationaryDifferences { leg: Leg, p_value: f64 },
    /// The regression residual keeps its unit root.
    NonStationaryResiduals { p_value: f64 },
    /// The test produced no p-value.
    Inconclusive { gate: Gate, reason: String },
}

impl Rejection {
    pub fn gate(&self) -> Gate {
        match self {
            Rejection::StationaryLevels { .. } => Gate::Levels,
            Rejection::NonStationaryDifferences { .. } => Gate::Differences,
            Rejection::NonStationaryResiduals { .. } => Gate::Residuals,
            Rejection::Inconclusive { gate, .. } => *gate,
        }
    }
}

/// Outcome of evaluating one pair.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Cointegrated(Regression),
    Rejected(Rejection),
}

/// A pair that passed every gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CointegratedPair {
    /// Position of the pair in the distance ranking.
    pub rank: usize,
    pub pair: CandidatePair,
    pub regression: Regression,
}

/// Runs the gate cascade over ranked candidates.
#[derive(Debug, Clone)]
pub struct CointegrationFilter<T: StationarityTest = AugmentedDickeyFuller> {
    significance: f64,
    test: T,
}

impl CointegrationFilter<AugmentedDickeyFuller> {
    /// Filter with the ADF test at the given significance level.
    pub fn new(significance: f64) -> Self {
        Self::with_test(significance, AugmentedDickeyFuller::new())
    }

    pub fn from_config(config: &SelectionConfig) -> Self {
        Self::with_test(
            config.significance,
            AugmentedDickeyFuller::with_max_lag(config.max_lag),
        )
    }
}

impl<T: StationarityTest> CointegrationFilter<T> {
    pub fn with_test(significance: f64, test: T) -> Self {
        Self { significance, test }
    }

    pub fn significance(&self) -> f64 {
        self.significance
    }

    /// Run the cascade on one pair over a positional window.
    ///
    /// Gate failures and inconclusive tests come back as [`Verdict::Rejected`]. Missing
    /// prices and a singular regression are returned as errors.
    pub fn evaluate(
        &self,
        table: &PriceTable,
        pair: &CandidatePair,
        range: Range<usize>,
    ) -> Result<Verdict> {
        let y = table.window_prices(&pair.high, range.clone())?;
        let x = table.window_prices(&pair.low, range)?;

        // Unit root must survive in both levels
        for (leg, series) in [(Leg::High, &y), (Leg::Low, &x)] {
            match self.p_value(Gate::Levels, series)? {
                Ok(p) if p >= self.significance => {}
                Ok(p_value) => {
                    return Ok(Verdict::Rejected(Rejection::StationaryLevels { leg, p_value }))
                }
                Err(rejection) => return Ok(Verdict::Rejected(rejection)),
            }
        }

        let dy = differences(&y);
        let dx = differences(&x);
        for (leg, series) in [(Leg::High, &dy), (Leg::Low, &dx)] {
            match self.p_value(Gate::Differences, series)? {
                Ok(p) if p < self.significance => {}
                Ok(p_value) => {
                    return Ok(Verdict::Rejected(
                        Rejection::NonStationaryDifferences { leg, p_value },
                    ))
                }
                Err(rejection) => return Ok(Verdict::Rejected(rejection)),
            }
        }

        let regression = Regression::fit(&y, &x)?;

        match self.p_value(Gate::Residuals, &regression.residuals)? {
            Ok(p) if p < self.significance => Ok(Verdict::Cointegrated(regression)),
            Ok(p_value) => Ok(Verdict::Rejected(Rejection::NonStationaryResiduals {
                p_value,
            })),
            Err(rejection) => Ok(Verdict::Rejected(rejection)),
        }
    }

    /// Filter ranked candidates, keeping survivors in rank order.
    ///
    /// Pair-local failures drop the pair with a warning; anything else aborts.
    pub fn filter(
        &self,
        table: &PriceTable,
        candidates: &[CandidatePair],
        range: Range<usize>,
    ) -> Result<Vec<CointegratedPair>> {
        let mut survivors = Vec::new();
        let mut rejected = 0usize;
        let mut skipped = 0usize;

        for (rank, pair) in candidates.iter().enumerate() {
            match self.evaluate(table, pair, range.clone()) {
                Ok(Verdict::Cointegrated(regression)) => {
                    debug!(
                        rank,
                        pair = %pair.key(),
                        hedge_ratio = regression.hedge_ratio,
                        intercept = regression.intercept,
                        "Pair cointegrated"
                    );
                    survivors.push(CointegratedPair {
                        rank,
                        pair: pair.clone(),
                        regression,
                    });
                }
                Ok(Verdict::Rejected(rejection)) => {
                    debug!(
                        rank,
                        pair = %pair.key(),
                        gate = %rejection.gate(),
                        ?rejection,
                        "Pair rejected"
                    );
                    rejected += 1;
                }
                Err(e) if e.is_pair_local() => {
                    warn!(rank, pair = %pair.key(), error = %e, "Skipping pair");
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            candidates = candidates.len(),
            cointegrated = survivors.len(),
            rejected,
            skipped,
            significance = self.significance,
            "Cointegration filter complete"
        );

        Ok(survivors)
    }

    /// Inner `Err` is a gate rejection; outer `Err` is a fatal error.
    fn p_value(
        &self,
        gate: Gate,
        series: &[f64],
    ) -> Result<std::result::Result<f64, Rejection>> {
        match self.test.p_value(series) {
            Ok(p) => Ok(Ok(p)),
            Err(Error::StatTestInconclusive(reason)) => {
                Ok(Err(Rejection::Inconclusive { gate, reason }))
            }
            Err(e) => Err(e),
        }
    }
}

/// Look up the ranked candidates behind a list of survivors.
pub fn surviving_pairs<'a>(
    candidates: &'a [CandidatePair],
    survivors: &[CointegratedPair],
) -> Vec<&'a CandidatePair> {
    survivors
        .iter()
        .filter_map(|s| candidates.get(s.rank))
        .collect()
}

fn differences(series: &[f64]) -> Vec<f64> {
    series.windows(2).map(|w| w[1] - w[0]).collect()
}
