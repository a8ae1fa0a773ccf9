//! Pair Selector
//!
//! Formation-window pair selection for futures pairs trading.
//!
//! # Features
//!
//! - **Distance Ranking**: min-max normalized cumulative returns compared by sum of
//!   squared deviations
//! - **Stationarity Testing**: augmented Dickey-Fuller with AIC lag selection behind a
//!   mockable trait
//! - **Cointegration Filter**: levels, differences and residual gates around an OLS
//!   hedge-ratio fit
//!
//! # Example
//!
//! ```ignore
//! use pair_selector::{rank_pairs, CointegrationFilter};
//!
//! let (start, end) = table.date_index(config.formation.start, config.formation.end);
//! let ranked = rank_pairs(&table, start..end)?;
//! let survivors = CointegrationFilter::from_config(&config.selection)
//!     .filter(&table, &ranked, start..end)?;
//! ```

pub mod cointegration;
pub mod distance;
pub mod regression;
pub mod stationarity;

pub use cointegration::{
    surviving_pairs, CointegratedPair, CointegrationFilter, Gate, Leg, Rejection, Verdict,
};
pub use distance::{normalize, rank_pairs, sum_squared_deviation};
pub use regression::Regression;
pub use stationarity::{mackinnon_p_value, AdfResult, AugmentedDickeyFuller, StationarityTest};
