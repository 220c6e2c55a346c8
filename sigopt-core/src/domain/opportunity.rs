//! Opportunity: a point in the snapshot history where a trade could have
//! reached its signal-type threshold, with the forward path to replay.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::signal_type::{Direction, SignalType};
use super::snapshot::Tick;

/// A (symbol, timestamp) point annotated with the best theoretically
/// achievable outcome over the lookahead window.
///
/// `forward` holds the valid ticks of the window `[i+1, i+H]` in order; it is
/// shorter than `H` near the end of the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub signal_type: SignalType,
    pub direction: Direction,
    pub entry_price: f64,
    pub atr: f64,
    pub support: f64,
    pub resistance: f64,
    /// Max favorable excursion over the window, in percent of entry.
    pub objective_profit: f64,
    /// 1-based tick index at which the signal-type threshold was first reached.
    pub time_to_target: usize,
    pub signal_score: f64,
    pub indicator_consensus: u32,
    pub forward: Vec<Tick>,
}

impl Opportunity {
    /// Distance from entry to the structural barrier in the trade direction
    /// (resistance for long, support for short), if it lies beyond entry.
    pub fn barrier_distance(&self) -> Option<f64> {
        let dist = match self.direction {
            Direction::Long => self.resistance - self.entry_price,
            Direction::Short => self.entry_price - self.support,
        };
        (dist > 0.0).then_some(dist)
    }
}

/// Sort opportunities chronologically (stable, ties keep symbol order).
pub fn sort_chronologically(opps: &mut [Opportunity]) {
    opps.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}
