//! Minimum-distance pair ranking.
//!
//! Each asset's cumulative return over the formation window is min-max normalized to
//! [0, 1]; the distance between two assets is the sum of squared pointwise differences.
//! Smaller distances mean closer historical co-movement.

use pairs_core::{CandidatePair, Error, PriceTable, Result};
use std::ops::Range;
use tracing::{debug, info, warn};

/// Min-max normalize a series to [0, 1].
///
/// Returns `None` for an empty series, a non-finite value, or a constant series.
pub fn normalize(values: &[f64]) -> Option<Vec<f64>> {
    if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return None;
    }

    Some(values.iter().map(|v| (v - min) / range).collect())
}

/// Sum of squared pointwise differences between two equally long series.
pub fn sum_squared_deviation(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Per-asset inputs to the pairwise distance.
#[derive(Debug, Clone)]
struct AssetProfile<'a> {
    asset: &'a str,
    mean_close: f64,
    normalized: Vec<f64>,
}

/// Rank every unordered asset pair by distance over a positional window.
///
/// Assets with gaps or a constant cumulative return inside the window are left out of
/// the ranking; an invalid window or unequal series lengths abort the run.
pub fn rank_pairs(table: &PriceTable, range: Range<usize>) -> Result<Vec<CandidatePair>> {
    validate_window(table, &range)?;

    let mut profiles = Vec::with_capacity(table.assets().len());
    for asset in table.assets() {
        match profile(table, asset, range.clone()) {
            Ok(p) => profiles.push(p),
            Err(e) if e.is_pair_local() => {
                warn!(asset = %asset, error = %e, "Excluding asset from ranking");
            }
            Err(e) => return Err(e),
        }
    }

    let mut candidates = Vec::with_capacity(profiles.len() * profiles.len().saturating_sub(1) / 2);
    for (i, a) in profiles.iter().enumerate() {
        for b in &profiles[i + 1..] {
            if a.normalized.len() != b.normalized.len() {
                return Err(Error::MisalignedSeries {
                    left: a.asset.to_string(),
                    left_len: a.normalized.len(),
                    right: b.asset.to_string(),
                    right_len: b.normalized.len(),
                });
            }

            let distance = sum_squared_deviation(&a.normalized, &b.normalized);
            candidates.push(CandidatePair::new(
                a.asset,
                a.mean_close,
                b.asset,
                b.mean_close,
                distance,
            ));
        }
    }

    // Stable: equal distances keep combination order
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    info!(
        assets = table.assets().len(),
        ranked_assets = profiles.len(),
        pairs = candidates.len(),
        start = range.start,
        end = range.end,
        "Ranked candidate pairs"
    );
    if let Some(best) = candidates.first() {
        debug!(pair = %best.key(), distance = best.distance, "Closest pair");
    }

    Ok(candidates)
}

fn validate_window(table: &PriceTable, range: &Range<usize>) -> Result<()> {
    let available = table.dates().len();
    if range.start >= range.end || range.end > available {
        return Err(Error::InvalidWindow {
            message: format!(
                "positions {}..{} do not fit {} trading dates",
                range.start, range.end, available
            ),
        });
    }
    Ok(())
}

fn profile<'a>(
    table: &PriceTable,
    asset: &'a str,
    range: Range<usize>,
) -> Result<AssetProfile<'a>> {
    table.window_prices(asset, range.clone())?;
    let mean_close = table
        .mean_close(asset, range.clone())
        .ok_or_else(|| Error::DataGap {
            asset: asset.to_string(),
            expected: range.len(),
            found: 0,
        })?;

    let cumulative = table
        .cumulative_returns(asset)
        .map(|c| c.window(range))
        .unwrap_or_default();
    let normalized = normalize(&cumulative).ok_or_else(|| Error::DegenerateSeries {
        asset: asset.to_string(),
        reason: "cumulative return is constant or non-finite over the window".to_string(),
    })?;

    Ok(AssetProfile {
        asset,
        mean_close,
        normalized,
    })
}
