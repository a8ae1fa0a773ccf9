//! Read access to the daily price table.
//!
//! All slicing is positional: a range `start..end` selects the `start`-th through
//! `end - 1`-th observation of an asset after sorting by date, the same positions that
//! [`PriceTable::date_index`] produces from calendar boundaries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::ops::Range;
use tracing::debug;

use crate::types::PriceBar;
use crate::{Error, Result};

/// Date-sorted observations of a single asset.
#[derive(Debug, Clone, Default)]
struct AssetSeries {
    dates: Vec<NaiveDate>,
    closes: Vec<f64>,
}

/// Cumulative return of one asset, aligned with its sorted dates.
///
/// The first value is undefined because there is no prior close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeReturnSeries {
    pub asset: String,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

impl CumulativeReturnSeries {
    /// Values restricted to `range`, with undefined entries dropped.
    pub fn window(&self, range: Range<usize>) -> Vec<f64> {
        clamp_slice(&self.values, range)
            .iter()
            .filter_map(|v| *v)
            .collect()
    }
}

/// Tabular price dataset of `(date, asset, close, volume)` rows.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    series: HashMap<String, AssetSeries>,
    rows: usize,
}

impl PriceTable {
    /// Build a table from raw rows.
    ///
    /// Rows may arrive in any order. Assets keep the order of their first appearance.
    pub fn new(rows: Vec<PriceBar>) -> Self {
        let mut assets: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<(NaiveDate, f64)>> = HashMap::new();
        let mut dates: Vec<NaiveDate> = Vec::with_capacity(rows.len());
        let row_count = rows.len();

        for row in rows {
            dates.push(row.date);
            let entry = grouped.entry(row.asset.clone()).or_insert_with(|| {
                assets.push(row.asset.clone());
                Vec::new()
            });
            entry.push((row.date, row.close));
        }

        dates.sort_unstable();
        dates.dedup();

        let series = grouped
            .into_iter()
            .map(|(asset, mut obs)| {
                obs.sort_by_key(|(date, _)| *date);
                let (dates, closes) = obs.into_iter().unzip();
                (asset, AssetSeries { dates, closes })
            })
            .collect();

        debug!(
            rows = row_count,
            assets = assets.len(),
            dates = dates.len(),
            "Built price table"
        );

        Self {
            dates,
            assets,
            series,
            rows: row_count,
        }
    }

    /// Build a table from a JSON array of `{date, asset, close, volume}` rows.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let rows: Vec<PriceBar> = serde_json::from_reader(reader)?;
        Ok(Self::new(rows))
    }

    /// Number of rows the table was built from.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Unique trading dates, sorted.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Trading dates restricted to a positional range.
    pub fn dates_in(&self, range: Range<usize>) -> &[NaiveDate] {
        clamp_slice(&self.dates, range)
    }

    /// Asset identifiers in order of first appearance.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Close prices of `asset` sorted by date and sliced by position.
    ///
    /// Returns an empty vector when the asset is absent.
    pub fn prices(&self, asset: &str, range: Range<usize>) -> Vec<f64> {
        self.series
            .get(asset)
            .map(|s| clamp_slice(&s.closes, range).to_vec())
            .unwrap_or_default()
    }

    /// First difference of [`PriceTable::prices`], leading undefined value dropped.
    pub fn price_diffs(&self, asset: &str, range: Range<usize>) -> Vec<f64> {
        self.prices(asset, range)
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }

    /// Close prices that must cover the whole window.
    ///
    /// Fails with [`Error::DataGap`] if the asset is absent, misses any trading date of
    /// the window, or has a non-finite close inside it. Missing dates are never filled
    /// by shifting later observations forward.
    pub fn window_prices(&self, asset: &str, range: Range<usize>) -> Result<Vec<f64>> {
        let expected = range.len();
        let calendar = self.dates_in(range.clone());
        let (dates, closes) = match self.series.get(asset) {
            Some(s) => (
                clamp_slice(&s.dates, range.clone()),
                clamp_slice(&s.closes, range),
            ),
            None => (&[][..], &[][..]),
        };

        let aligned = calendar.len() == expected && dates == calendar;
        let found = dates
            .iter()
            .zip(closes)
            .filter(|(d, c)| c.is_finite() && calendar.binary_search(*d).is_ok())
            .count();

        if !aligned || found < expected {
            return Err(Error::DataGap {
                asset: asset.to_string(),
                expected,
                found,
            });
        }

        Ok(closes.to_vec())
    }

    /// Mean close over a positional window.
    pub fn mean_close(&self, asset: &str, range: Range<usize>) -> Option<f64> {
        let prices = self.prices(asset, range);
        if prices.is_empty() {
            return None;
        }
        Some(prices.iter().sum::<f64>() / prices.len() as f64)
    }

    /// Map calendar boundaries to positions.
    ///
    /// Each index counts the unique dates on or before the boundary, so the result can
    /// be used directly as a `start..end` slice.
    pub fn date_index(&self, start_date: NaiveDate, end_date: NaiveDate) -> (usize, usize) {
        let start = self.dates.partition_point(|d| *d <= start_date);
        let end = self.dates.partition_point(|d| *d <= end_date);
        (start, end)
    }

    /// Cumulative return series of one asset over its full history.
    pub fn cumulative_returns(&self, asset: &str) -> Option<CumulativeReturnSeries> {
        let series = self.series.get(asset)?;
        let mut values = Vec::with_capacity(series.closes.len());
        let mut cumulative: Option<f64> = None;

        for (i, close) in series.closes.iter().enumerate() {
            if i == 0 {
                values.push(None);
                continue;
            }
            let prev = series.closes[i - 1];
            let ret = (close - prev) / prev;
            let next = cumulative.unwrap_or(1.0) * (1.0 + ret);
            cumulative = Some(next);
            values.push(cumulative);
        }

        Some(CumulativeReturnSeries {
            asset: asset.to_string(),
            dates: series.dates.clone(),
            values,
        })
    }
}

fn clamp_slice<T>(values: &[T], range: Range<usize>) -> &[T] {
    let end = range.end.min(values.len());
    let start = range.start.min(end);
    &values[start..end]
}
