//! Error types for the pairs trading pipeline.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Data gap for {asset}: expected {expected} observations, found {found}")]
    DataGap {
        asset: String,
        expected: usize,
        found: usize,
    },

    #[error("Degenerate series for {asset}: {reason}")]
    DegenerateSeries { asset: String, reason: String },

    #[error("Stationarity test inconclusive: {0}")]
    StatTestInconclusive(String),

    #[error("Insufficient capital: account {account} cannot buy one lot of {lot_size} at {price}")]
    InsufficientCapital {
        account: Decimal,
        price: f64,
        lot_size: Decimal,
    },

    #[error("Invalid window: {message}")]
    InvalidWindow { message: String },

    #[error("Misaligned series: {left} has {left_len} values, {right} has {right_len}")]
    MisalignedSeries {
        left: String,
        left_len: usize,
        right: String,
        right_len: usize,
    },

    #[error("Non-finite value in {0}")]
    NonFinite(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Whether the error only disqualifies a single asset or pair.
    ///
    /// Pair-level failures are skipped by the pipeline; everything else aborts the run.
    pub fn is_pair_local(&self) -> bool {
        matches!(
            self,
            Error::DataGap { .. }
                | Error::DegenerateSeries { .. }
                | Error::StatTestInconclusive(_)
                | Error::InsufficientCapital { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_local_classification() {
        let gap = Error::DataGap {
            asset: "cu".to_string(),
            expected: 10,
            found: 8,
        };
        assert!(gap.is_pair_local());
        assert!(Error::StatTestInconclusive("nan".into()).is_pair_local());

        let window = Error::InvalidWindow {
            message: "start after end".into(),
        };
        assert!(!window.is_pair_local());
        assert!(!Error::Config {
            message: "bad".into()
        }
        .is_pair_local());
    }

    #[test]
    fn test_error_display() {
        let err = Error::MisalignedSeries {
            left: "rb".into(),
            left_len: 5,
            right: "hc".into(),
            right_len: 4,
        };
        assert_eq!(
            err.to_string(),
            "Misaligned series: rb has 5 values, hc has 4"
        );
    }
}
