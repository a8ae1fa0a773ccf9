//! Core types shared by every stage of the pipeline.

use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One row of the daily price table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Trading date.
    pub date: NaiveDate,
    /// Asset identifier (futures variety code).
    pub asset: String,
    /// Closing price.
    pub close: f64,
    /// Traded volume.
    pub volume: f64,
}

impl PriceBar {
    /// Create a new price row.
    pub fn new(date: NaiveDate, asset: &str, close: f64, volume: f64) -> Self {
        Self {
            date,
            asset: asset.to_string(),
            close,
            volume,
        }
    }
}

/// Calendar bounds of an analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

/// A ranked pair candidate produced by the distance ranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePair {
    /// Asset with the greater mean close over the formation window (regression `y`).
    pub high: String,
    /// The other asset (regression `x`).
    pub low: String,
    /// Sum of squared deviations between the normalized cumulative returns.
    pub distance: f64,
}

impl CandidatePair {
    /// Build a pair from two assets and their mean prices.
    ///
    /// The asset with the higher mean becomes `high`. Equal means fall back to the
    /// lexicographically smaller identifier so that argument order never matters.
    pub fn new(a: &str, mean_a: f64, b: &str, mean_b: f64, distance: f64) -> Self {
        let a_is_high = if mean_a != mean_b {
            mean_a > mean_b
        } else {
            a <= b
        };

        let (high, low) = if a_is_high { (a, b) } else { (b, a) };

        Self {
            high: high.to_string(),
            low: low.to_string(),
            distance,
        }
    }

    /// Canonical `high-low` key.
    pub fn key(&self) -> String {
        format!("{}-{}", self.high, self.low)
    }
}

/// Convert a float into a `Decimal`, rejecting NaN and infinities.
pub fn to_decimal(value: f64, what: &str) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(Error::NonFinite(what.to_string()));
    }
    Decimal::from_f64(value).ok_or_else(|| Error::NonFinite(what.to_string()))
}
