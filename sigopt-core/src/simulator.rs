//! Trade outcome simulator: replays one parameter set against one
//! opportunity's forward path.
//!
//! Stop and target levels come from the entry ATR. Exits fill exactly at the
//! level; there is no slippage or commission model.

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, Opportunity, ParameterSet, Tick};

/// Resolution of a tick that crosses both the stop and the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarPolicy {
    /// Stop-loss first (conservative)
    #[default]
    WorstCase,

    /// Take-profit first (optimistic)
    BestCase,

    /// Bullish tick walks O → L → H → C, bearish tick walks O → H → L → C.
    OhlcOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "TP")]
    TakeProfit,
    #[serde(rename = "SL")]
    StopLoss,
    #[serde(rename = "TIME")]
    Time,
}

/// Result of one simulated trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    /// Signed profit in percent of entry.
    pub pnl_pct: f64,
    pub exit_reason: ExitReason,
    pub exit_price: f64,
    /// Ticks replayed before the exit (0 for an empty path).
    pub ticks_held: usize,
}

/// Risk:reward of an opportunity under a parameter set.
///
/// Reward is the target distance, capped by the structural barrier when the
/// barrier lies beyond entry. Risk is the stop distance.
pub fn risk_reward(opp: &Opportunity, params: &ParameterSet) -> f64 {
    let risk = opp.atr * params.atr_stop_multiplier();
    let target = opp.atr * params.atr_tp_multiplier();
    let reward = match opp.barrier_distance() {
        Some(barrier) => target.min(barrier),
        None => target,
    };
    if risk > 0.0 {
        reward / risk
    } else {
        0.0
    }
}

/// Signal-score, consensus and risk:reward gates. An opportunity that fails
/// any gate is never traded.
pub fn passes_gates(opp: &Opportunity, params: &ParameterSet) -> bool {
    opp.signal_score >= params.min_signal_score()
        && opp.indicator_consensus >= params.min_indicator_consensus()
        && risk_reward(opp, params) >= params.min_risk_reward()
}

fn stop_first(policy: IntrabarPolicy, direction: Direction, tick: &Tick) -> bool {
    match policy {
        IntrabarPolicy::WorstCase => true,
        IntrabarPolicy::BestCase => false,
        // bullish visits the low first, bearish the high
        IntrabarPolicy::OhlcOrder => match direction {
            Direction::Long => tick.is_bullish(),
            Direction::Short => !tick.is_bullish(),
        },
    }
}

fn pnl_pct(direction: Direction, entry: f64, exit: f64) -> f64 {
    direction.sign() * (exit - entry) / entry * 100.0
}

/// Replay `params` against `opp`. Returns `None` when the opportunity fails
/// the entry gates.
pub fn simulate(
    opp: &Opportunity,
    params: &ParameterSet,
    policy: IntrabarPolicy,
) -> Option<TradeOutcome> {
    if !passes_gates(opp, params) {
        return None;
    }

    let entry = opp.entry_price;
    let sign = opp.direction.sign();
    let stop = entry - sign * opp.atr * params.atr_stop_multiplier();
    let target = entry + sign * opp.atr * params.atr_tp_multiplier();
    let horizon = (params.max_holding_periods() as usize).min(opp.forward.len());

    for (k, tick) in opp.forward[..horizon].iter().enumerate() {
        let (hit_stop, hit_target) = match opp.direction {
            Direction::Long => (tick.low <= stop, tick.high >= target),
            Direction::Short => (tick.high >= stop, tick.low <= target),
        };
        let exit = match (hit_stop, hit_target) {
            (false, false) => None,
            (true, false) => Some((ExitReason::StopLoss, stop)),
            (false, true) => Some((ExitReason::TakeProfit, target)),
            (true, true) => {
                if stop_first(policy, opp.direction, tick) {
                    Some((ExitReason::StopLoss, stop))
                } else {
                    Some((ExitReason::TakeProfit, target))
                }
            }
        };
        if let Some((exit_reason, exit_price)) = exit {
            return Some(TradeOutcome {
                pnl_pct: pnl_pct(opp.direction, entry, exit_price),
                exit_reason,
                exit_price,
                ticks_held: k + 1,
            });
        }
    }

    let exit_price = match horizon {
        0 => entry,
        h => opp.forward[h - 1].close,
    };
    Some(TradeOutcome {
        pnl_pct: pnl_pct(opp.direction, entry, exit_price),
        exit_reason: ExitReason::Time,
        exit_price,
        ticks_held: horizon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ParameterSetRecord, SignalType};
    use chrono::NaiveDate;

    fn params(stop: f64, tp: f64, hold: u32) -> ParameterSet {
        ParameterSet::new(ParameterSetRecord {
            min_risk_reward: 0.1,
            min_signal_score: 50.0,
            min_indicator_consensus: 1,
            atr_stop_multiplier: stop,
            atr_tp_multiplier: tp,
            max_holding_periods: hold,
        })
        .unwrap()
    }

    fn tick(open: f64, high: f64, low: f64, close: f64) -> Tick {
        Tick {
            open,
            high,
            low,
            close,
        }
    }

    fn opp(direction: Direction, forward: Vec<Tick>) -> Opportunity {
        Opportunity {
            symbol: "BTC".into(),
            timestamp: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            signal_type: SignalType::Scalping,
            direction,
            entry_price: 100.0,
            atr: 1.0,
            support: 90.0,
            resistance: 110.0,
            objective_profit: 2.0,
            time_to_target: 1,
            signal_score: 70.0,
            indicator_consensus: 2,
            forward,
        }
    }

    #[test]
    fn long_take_profit_fills_at_level() {
        let o = opp(Direction::Long, vec![tick(100.0, 100.5, 99.8, 100.2), tick(100.2, 102.5, 100.0, 102.0)]);
        let out = simulate(&o, &params(1.0, 2.0, 10), IntrabarPolicy::WorstCase).unwrap();
        assert_eq!(out.exit_reason, ExitReason::TakeProfit);
        assert_eq!(out.exit_price, 102.0);
        assert_eq!(out.ticks_held, 2);
        assert!((out.pnl_pct - 2.0).abs() < 1e-12);
    }

    #[test]
    fn short_stop_loss() {
        let o = opp(Direction::Short, vec![tick(100.0, 101.5, 99.9, 101.2)]);
        let out = simulate(&o, &params(1.0, 2.0, 10), IntrabarPolicy::WorstCase).unwrap();
        assert_eq!(out.exit_reason, ExitReason::StopLoss);
        assert!((out.pnl_pct + 1.0).abs() < 1e-12);
    }

    #[test]
    fn same_tick_collision_follows_policy() {
        // crosses both 99 (stop) and 102 (target)
        let bullish = tick(100.0, 102.5, 98.5, 102.0);
        let bearish = tick(100.0, 102.5, 98.5, 99.0);
        let p = params(1.0, 2.0, 10);

        let worst = simulate(&opp(Direction::Long, vec![bullish]), &p, IntrabarPolicy::WorstCase).unwrap();
        assert_eq!(worst.exit_reason, ExitReason::StopLoss);

        let best = simulate(&opp(Direction::Long, vec![bullish]), &p, IntrabarPolicy::BestCase).unwrap();
        assert_eq!(best.exit_reason, ExitReason::TakeProfit);

        let ohlc_bull = simulate(&opp(Direction::Long, vec![bullish]), &p, IntrabarPolicy::OhlcOrder).unwrap();
        assert_eq!(ohlc_bull.exit_reason, ExitReason::StopLoss);
        let ohlc_bear = simulate(&opp(Direction::Long, vec![bearish]), &p, IntrabarPolicy::OhlcOrder).unwrap();
        assert_eq!(ohlc_bear.exit_reason, ExitReason::TakeProfit);
    }

    #[test]
    fn time_exit_at_last_close_within_holding() {
        let forward = vec![
            tick(100.0, 100.3, 99.7, 100.1),
            tick(100.1, 100.4, 99.8, 100.3),
            tick(100.3, 100.6, 99.9, 100.5),
        ];
        let out = simulate(&opp(Direction::Long, forward), &params(1.0, 2.0, 2), IntrabarPolicy::WorstCase).unwrap();
        assert_eq!(out.exit_reason, ExitReason::Time);
        assert_eq!(out.ticks_held, 2);
        assert_eq!(out.exit_price, 100.3);
    }

    #[test]
    fn short_path_and_empty_path() {
        let out = simulate(
            &opp(Direction::Long, vec![tick(100.0, 100.3, 99.7, 100.2)]),
            &params(1.0, 2.0, 24),
            IntrabarPolicy::WorstCase,
        )
        .unwrap();
        assert_eq!(out.ticks_held, 1);
        assert_eq!(out.exit_price, 100.2);

        let empty = simulate(&opp(Direction::Long, vec![]), &params(1.0, 2.0, 24), IntrabarPolicy::WorstCase).unwrap();
        assert_eq!(empty.exit_reason, ExitReason::Time);
        assert_eq!(empty.pnl_pct, 0.0);
        assert_eq!(empty.ticks_held, 0);
    }

    #[test]
    fn gates_exclude_from_simulation() {
        let mut o = opp(Direction::Long, vec![tick(100.0, 103.0, 99.5, 102.0)]);
        o.signal_score = 40.0;
        assert!(simulate(&o, &params(1.0, 2.0, 10), IntrabarPolicy::WorstCase).is_none());

        let mut o = opp(Direction::Long, vec![]);
        o.indicator_consensus = 0;
        assert!(simulate(&o, &params(1.0, 2.0, 10), IntrabarPolicy::WorstCase).is_none());
    }

    #[test]
    fn risk_reward_capped_by_barrier() {
        let mut o = opp(Direction::Long, vec![]);
        let p = params(1.0, 3.0, 10);
        assert!((risk_reward(&o, &p) - 3.0).abs() < 1e-12);
        o.resistance = 101.5;
        assert!((risk_reward(&o, &p) - 1.5).abs() < 1e-12);
        // barrier behind entry is ignored
        o.resistance = 99.0;
        assert!((risk_reward(&o, &p) - 3.0).abs() < 1e-12);
    }
}
