//! Opportunity identifier.
//!
//! Scans a per-symbol snapshot series and labels every point whose forward
//! window reaches the scalping and/or swing excursion threshold. Pure: the
//! only output is the returned report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    sort_chronologically, Direction, MarketSnapshot, Opportunity, SignalType, Symbol, Tick,
};

/// Identification thresholds and windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpportunityConfig {
    /// Lookahead horizon H in ticks.
    pub lookahead_ticks: usize,
    /// Scalping threshold in percent of entry.
    pub scalping_threshold_pct: f64,
    /// Swing threshold in percent of entry.
    pub swing_threshold_pct: f64,
    /// Scalping threshold must be reached within this many ticks.
    pub scalping_window_ticks: usize,
}

impl Default for OpportunityConfig {
    fn default() -> Self {
        // 96 x 15-minute snapshots = 24h
        Self {
            lookahead_ticks: 96,
            scalping_threshold_pct: 1.5,
            swing_threshold_pct: 3.0,
            scalping_window_ticks: 24,
        }
    }
}

impl OpportunityConfig {
    fn threshold(&self, signal_type: SignalType) -> f64 {
        match signal_type {
            SignalType::Scalping => self.scalping_threshold_pct,
            SignalType::Swing => self.swing_threshold_pct,
        }
    }

    fn reach_window(&self, signal_type: SignalType) -> usize {
        match signal_type {
            SignalType::Scalping => self.scalping_window_ticks.min(self.lookahead_ticks),
            SignalType::Swing => self.lookahead_ticks,
        }
    }
}

/// Output of a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifyReport {
    pub opportunities: Vec<Opportunity>,
    /// Snapshots examined as entry candidates.
    pub scanned: usize,
    /// Entry candidates skipped for missing or malformed fields.
    pub skipped: usize,
}

impl IdentifyReport {
    pub fn count(&self, signal_type: SignalType) -> usize {
        self.opportunities
            .iter()
            .filter(|o| o.signal_type == signal_type)
            .count()
    }

    /// Opportunities of one signal type, chronologically ordered.
    pub fn of_type(&self, signal_type: SignalType) -> Vec<Opportunity> {
        let mut out: Vec<Opportunity> = self
            .opportunities
            .iter()
            .filter(|o| o.signal_type == signal_type)
            .cloned()
            .collect();
        sort_chronologically(&mut out);
        out
    }

    fn absorb(&mut self, other: IdentifyReport) {
        self.opportunities.extend(other.opportunities);
        self.scanned += other.scanned;
        self.skipped += other.skipped;
    }
}

/// Per-direction excursion summary over a forward path.
#[derive(Debug, Clone, Copy)]
struct Excursion {
    direction: Direction,
    /// Max favorable excursion over the whole path, in percent.
    max_pct: f64,
    /// 1-based tick at which the threshold was first reached, if within reach.
    reach: Option<usize>,
}

fn favorable_pct(direction: Direction, entry: f64, tick: &Tick) -> f64 {
    match direction {
        Direction::Long => (tick.high - entry) / entry * 100.0,
        Direction::Short => (entry - tick.low) / entry * 100.0,
    }
}

fn excursion(direction: Direction, entry: f64, path: &[Tick], threshold: f64, window: usize) -> Excursion {
    let mut max_pct = 0.0_f64;
    let mut reach = None;
    for (k, tick) in path.iter().enumerate() {
        let pct = favorable_pct(direction, entry, tick);
        max_pct = max_pct.max(pct);
        if reach.is_none() && k < window && pct >= threshold {
            reach = Some(k + 1);
        }
    }
    Excursion {
        direction,
        max_pct,
        reach,
    }
}

/// Earliest reach wins; equal reach goes to the larger excursion, then long.
fn choose(long: Excursion, short: Excursion) -> Option<Excursion> {
    match (long.reach, short.reach) {
        (None, None) => None,
        (Some(_), None) => Some(long),
        (None, Some(_)) => Some(short),
        (Some(l), Some(s)) if l < s => Some(long),
        (Some(l), Some(s)) if s < l => Some(short),
        _ => {
            if short.max_pct > long.max_pct {
                Some(short)
            } else {
                Some(long)
            }
        }
    }
}

fn scan(series: &[&MarketSnapshot], cfg: &OpportunityConfig) -> IdentifyReport {
    let mut report = IdentifyReport::default();
    let n = series.len();

    for (i, snap) in series.iter().enumerate() {
        report.scanned += 1;
        let entry = match snap.entry_fields() {
            Ok(fields) => fields,
            Err(err) => {
                debug!(error = %err, "skipping snapshot");
                report.skipped += 1;
                continue;
            }
        };

        let end = (i + cfg.lookahead_ticks).min(n.saturating_sub(1));
        let forward: Vec<Tick> = series
            .get(i + 1..=end)
            .unwrap_or(&[])
            .iter()
            .filter_map(|s| s.tick().ok())
            .collect();
        if forward.is_empty() {
            continue;
        }

        let entry_price = entry.tick.close;
        for signal_type in SignalType::ALL {
            let threshold = cfg.threshold(signal_type);
            let window = cfg.reach_window(signal_type);
            let long = excursion(Direction::Long, entry_price, &forward, threshold, window);
            let short = excursion(Direction::Short, entry_price, &forward, threshold, window);
            let Some(best) = choose(long, short) else {
                continue;
            };
            let Some(time_to_target) = best.reach else {
                continue;
            };
            report.opportunities.push(Opportunity {
                symbol: snap.symbol.clone(),
                timestamp: snap.timestamp,
                signal_type,
                direction: best.direction,
                entry_price,
                atr: entry.atr,
                support: entry.support,
                resistance: entry.resistance,
                objective_profit: best.max_pct,
                time_to_target,
                signal_score: entry.signal_score,
                indicator_consensus: entry.indicator_consensus,
                forward: forward.clone(),
            });
        }
    }
    report
}

/// Identify opportunities in one symbol's snapshot series.
///
/// The series is stable-sorted by timestamp first, so the caller's order only
/// matters for duplicate timestamps.
pub fn identify_opportunities(series: &[MarketSnapshot], cfg: &OpportunityConfig) -> IdentifyReport {
    let mut ordered: Vec<&MarketSnapshot> = series.iter().collect();
    ordered.sort_by_key(|s| s.timestamp);
    scan(&ordered, cfg)
}

/// Identify opportunities across many symbols. Snapshots are grouped by
/// symbol and results concatenated in symbol order.
pub fn identify_all(snapshots: &[MarketSnapshot], cfg: &OpportunityConfig) -> IdentifyReport {
    let mut by_symbol: BTreeMap<&Symbol, Vec<&MarketSnapshot>> = BTreeMap::new();
    for snap in snapshots {
        by_symbol.entry(&snap.symbol).or_default().push(snap);
    }

    let mut report = IdentifyReport::default();
    for (symbol, mut series) in by_symbol {
        series.sort_by_key(|s| s.timestamp);
        let part = scan(&series, cfg);
        debug!(
            symbol = %symbol,
            scanned = part.scanned,
            skipped = part.skipped,
            found = part.opportunities.len(),
            "identified opportunities"
        );
        report.absorb(part);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// Snapshot with a tight range around `close`.
    fn snap(symbol: &str, i: i64, close: f64) -> MarketSnapshot {
        MarketSnapshot {
            symbol: symbol.into(),
            timestamp: t0() + Duration::minutes(15 * i),
            open: Some(close),
            high: Some(close * 1.001),
            low: Some(close * 0.999),
            close: Some(close),
            volume: Some(10.0),
            atr: Some(close * 0.01),
            support: Some(close * 0.97),
            resistance: Some(close * 1.05),
            signal_score: Some(70.0),
            indicator_consensus: Some(2),
        }
    }

    fn cfg() -> OpportunityConfig {
        OpportunityConfig {
            lookahead_ticks: 8,
            scalping_threshold_pct: 1.5,
            swing_threshold_pct: 3.0,
            scalping_window_ticks: 3,
        }
    }

    #[test]
    fn flat_series_has_no_opportunities() {
        let series: Vec<_> = (0..20).map(|i| snap("BTC", i, 100.0)).collect();
        let report = identify_opportunities(&series, &cfg());
        assert!(report.opportunities.is_empty());
        assert_eq!(report.scanned, 20);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn quick_rally_is_both_scalping_and_swing() {
        let mut series = vec![snap("BTC", 0, 100.0)];
        series.push(snap("BTC", 1, 102.0));
        series.push(snap("BTC", 2, 104.0));
        let report = identify_opportunities(&series, &cfg());

        let first: Vec<_> = report
            .opportunities
            .iter()
            .filter(|o| o.timestamp == t0())
            .collect();
        assert_eq!(first.len(), 2);
        let scalp = first.iter().find(|o| o.signal_type == SignalType::Scalping).unwrap();
        assert_eq!(scalp.direction, Direction::Long);
        assert_eq!(scalp.time_to_target, 1);
        let swing = first.iter().find(|o| o.signal_type == SignalType::Swing).unwrap();
        assert_eq!(swing.time_to_target, 2);
        // objective profit covers the whole window: 104 * 1.001
        assert!((swing.objective_profit - 4.104).abs() < 1e-9);
    }

    #[test]
    fn slow_rally_is_swing_only() {
        // 0.4% per tick is too slow for the 3-tick scalping window
        let series: Vec<_> = (0..10)
            .map(|i| snap("BTC", i, 100.0 * (1.0 + 0.004 * i as f64)))
            .collect();
        let report = identify_opportunities(&series, &cfg());
        let at_start: Vec<_> = report
            .opportunities
            .iter()
            .filter(|o| o.timestamp == t0())
            .collect();
        assert_eq!(at_start.len(), 1);
        assert_eq!(at_start[0].signal_type, SignalType::Swing);
    }

    #[test]
    fn selloff_yields_short() {
        let series = vec![snap("ETH", 0, 100.0), snap("ETH", 1, 97.0)];
        let report = identify_opportunities(&series, &cfg());
        assert!(report
            .opportunities
            .iter()
            .all(|o| o.direction == Direction::Short));
        assert_eq!(report.count(SignalType::Swing), 1);
    }

    #[test]
    fn missing_fields_are_skipped_and_counted() {
        let mut series: Vec<_> = (0..4).map(|i| snap("BTC", i, 100.0)).collect();
        series[0].atr = None;
        series[1].signal_score = None;
        let report = identify_opportunities(&series, &cfg());
        assert_eq!(report.skipped, 2);
        assert_eq!(report.scanned, 4);
    }

    #[test]
    fn forward_ticks_without_ohlc_are_dropped() {
        let mut series = vec![snap("BTC", 0, 100.0), snap("BTC", 1, 100.0), snap("BTC", 2, 104.0)];
        series[1].high = None;
        let report = identify_opportunities(&series, &cfg());
        let opp = report
            .opportunities
            .iter()
            .find(|o| o.timestamp == t0() && o.signal_type == SignalType::Swing)
            .unwrap();
        assert_eq!(opp.forward.len(), 1);
        assert_eq!(opp.time_to_target, 1);
    }

    #[test]
    fn tail_points_use_truncated_window() {
        let series: Vec<_> = (0..5)
            .map(|i| snap("BTC", i, if i == 4 { 104.0 } else { 100.0 }))
            .collect();
        let report = identify_opportunities(&series, &cfg());
        let at_3 = report
            .opportunities
            .iter()
            .find(|o| o.timestamp == t0() + Duration::minutes(45))
            .unwrap();
        assert_eq!(at_3.forward.len(), 1);
        // the last point has no forward ticks at all
        assert!(report
            .opportunities
            .iter()
            .all(|o| o.timestamp != t0() + Duration::minutes(60)));
    }

    #[test]
    fn input_order_is_normalised() {
        let series = vec![snap("BTC", 0, 100.0), snap("BTC", 1, 102.0), snap("BTC", 2, 104.0)];
        let mut reversed = series.clone();
        reversed.reverse();
        assert_eq!(
            identify_opportunities(&series, &cfg()),
            identify_opportunities(&reversed, &cfg())
        );
    }

    #[test]
    fn identify_all_groups_by_symbol() {
        let mut snaps = vec![snap("ETH", 0, 100.0), snap("ETH", 1, 104.0)];
        snaps.extend([snap("BTC", 0, 100.0), snap("BTC", 1, 104.0)]);
        let report = identify_all(&snaps, &cfg());
        assert_eq!(report.scanned, 4);
        assert_eq!(report.opportunities[0].symbol, "BTC");
        assert_eq!(report.opportunities.last().unwrap().symbol, "ETH");
    }

    #[test]
    fn equal_reach_prefers_larger_excursion() {
        let long = Excursion {
            direction: Direction::Long,
            max_pct: 2.0,
            reach: Some(1),
        };
        let short = Excursion {
            direction: Direction::Short,
            max_pct: 2.5,
            reach: Some(1),
        };
        assert_eq!(choose(long, short).unwrap().direction, Direction::Short);
        let tied = Excursion { max_pct: 2.0, ..short };
        assert_eq!(choose(long, tied).unwrap().direction, Direction::Long);
    }
}
