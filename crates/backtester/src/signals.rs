//! Spread zones and the transition table that turns them into trade actions.
//!
//! The formation-window residual mean and standard deviation split the real line into
//! seven bands. Bands are right-closed, so a spread sitting exactly on an edge belongs to
//! the band below it.

use pairs_core::config::{SignalMode, StrategyConfig};
use pairs_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Band of the spread relative to the formation residual distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Below `mean - stop * std`.
    LowerStop,
    /// `(mean - stop * std, mean - open * std]`
    LowerOpen,
    /// `(mean - open * std, mean - close * std]`
    LowerHold,
    /// `(mean - close * std, mean + close * std]`
    Center,
    /// `(mean + close * std, mean + open * std]`
    UpperHold,
    /// `(mean + open * std, mean + stop * std]`
    UpperOpen,
    /// Above `mean + stop * std`.
    UpperStop,
}

impl Zone {
    const ALL: [Zone; 7] = [
        Zone::LowerStop,
        Zone::LowerOpen,
        Zone::LowerHold,
        Zone::Center,
        Zone::UpperHold,
        Zone::UpperOpen,
        Zone::UpperStop,
    ];

    /// Signed band index in `-3..=3`.
    pub fn offset(self) -> i8 {
        match self {
            Zone::LowerStop => -3,
            Zone::LowerOpen => -2,
            Zone::LowerHold => -1,
            Zone::Center => 0,
            Zone::UpperHold => 1,
            Zone::UpperOpen => 2,
            Zone::UpperStop => 3,
        }
    }

    pub fn from_offset(offset: i8) -> Option<Self> {
        Self::ALL.iter().copied().find(|z| z.offset() == offset)
    }
}

/// Which way a position leans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Long the high asset, short the low asset. Opened when the spread is cheap.
    Forward,
    /// Short the high asset, long the low asset. Opened when the spread is rich.
    Reverse,
}

impl Direction {
    /// Sign of the high-asset leg.
    pub fn y_sign(self) -> i8 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }
}

/// What a transition asks the simulator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Hold,
    Open(Direction),
    Close(Direction),
    /// Close after the spread breaks through the stop band.
    StopLoss(Direction),
}

/// Band edges derived from formation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneBands {
    /// Interior edges in ascending order; the outer edges are infinite.
    edges: [f64; 6],
}

impl ZoneBands {
    /// Build bands from the residual mean and standard deviation.
    ///
    /// Fails with [`Error::DegenerateSeries`] when the deviation is zero or any input is
    /// non-finite, and with [`Error::Config`] when the thresholds are not ordered.
    pub fn new(mean: f64, std: f64, strategy: &StrategyConfig) -> Result<Self> {
        if !mean.is_finite() || !std.is_finite() || std <= 0.0 {
            return Err(Error::DegenerateSeries {
                asset: "spread".to_string(),
                reason: format!("residual mean {} and std {} cannot define bands", mean, std),
            });
        }
        pairs_core::config::validate_thresholds(
            strategy.close_threshold,
            strategy.open_threshold,
            strategy.stop_threshold,
        )?;

        let (close, open, stop) = (
            strategy.close_threshold,
            strategy.open_threshold,
            strategy.stop_threshold,
        );
        Ok(Self {
            edges: [
                mean - stop * std,
                mean - open * std,
                mean - close * std,
                mean + close * std,
                mean + open * std,
                mean + stop * std,
            ],
        })
    }

    pub fn edges(&self) -> &[f64; 6] {
        &self.edges
    }

    /// Zone of one spread value; `None` when the value is not finite.
    pub fn classify(&self, value: f64) -> Option<Zone> {
        if !value.is_finite() {
            return None;
        }
        // Count of edges strictly below the value: (e_k, e_{k+1}] -> band k
        let band = self.edges.partition_point(|edge| *edge < value);
        Zone::ALL.get(band).copied()
    }

    pub fn classify_all(&self, spread: &[f64]) -> Vec<Option<Zone>> {
        spread.iter().map(|v| self.classify(*v)).collect()
    }
}

/// Map a day-over-day zone change to an action.
pub fn transition(previous: Zone, current: Zone, stop_loss: bool) -> Action {
    use Zone::*;

    match (previous, current) {
        (UpperHold, UpperOpen) => Action::Open(Direction::Reverse),
        (UpperHold, Center) => Action::Close(Direction::Reverse),
        (LowerHold, LowerOpen) => Action::Open(Direction::Forward),
        (LowerHold, Center) => Action::Close(Direction::Forward),
        (UpperOpen, UpperStop) if stop_loss => Action::StopLoss(Direction::Reverse),
        (LowerOpen, LowerStop) if stop_loss => Action::StopLoss(Direction::Forward),
        _ => Action::Hold,
    }
}

/// Raw transition for every day of a zone path. Day 0 and any day touching an undefined
/// zone hold.
pub fn raw_actions(zones: &[Option<Zone>], stop_loss: bool) -> Vec<Action> {
    let mut actions = Vec::with_capacity(zones.len());
    if zones.is_empty() {
        return actions;
    }
    actions.push(Action::Hold);
    actions.extend(zones.windows(2).map(|w| match (w[0], w[1]) {
        (Some(prev), Some(curr)) => transition(prev, curr, stop_loss),
        _ => Action::Hold,
    }));
    actions
}

/// Filter a raw action against the current position.
///
/// `Strict` discards every action, which leaves the book flat for the whole window.
/// `Corrected` opens only when flat and closes only a position of the matching direction.
pub fn effective_action(action: Action, mode: SignalMode, position: Option<Direction>) -> Action {
    match mode {
        SignalMode::Strict => Action::Hold,
        SignalMode::Corrected => match (action, position) {
            (Action::Open(_), None) => action,
            (Action::Close(d), Some(p)) | (Action::StopLoss(d), Some(p)) if d == p => action,
            _ => Action::Hold,
        },
    }
}
