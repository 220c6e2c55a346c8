//! SimulationResult: aggregate of one parameter set over an opportunity set.

use serde::{Deserialize, Serialize};

use crate::domain::{Opportunity, ParameterSet};
use crate::simulator::{simulate, ExitReason, IntrabarPolicy, TradeOutcome};

/// Upper bound applied to `profit_ratio` (also used when there are no losses).
pub const PROFIT_RATIO_CAP: f64 = 10.0;

/// Aggregated outcome. Profit figures are in percent of entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub total_opportunities: usize,
    pub captured_count: usize,
    pub take_profit_count: usize,
    pub stop_loss_count: usize,
    pub time_exit_count: usize,
    pub total_profit: f64,
    pub avg_profit: f64,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_ratio: f64,
    /// Largest peak-to-trough drop of the cumulative pnl curve.
    pub max_drawdown: f64,
}

impl SimulationResult {
    pub fn capture_rate(&self) -> f64 {
        if self.total_opportunities == 0 {
            0.0
        } else {
            self.captured_count as f64 / self.total_opportunities as f64
        }
    }

    pub fn time_exit_rate(&self) -> f64 {
        if self.captured_count == 0 {
            0.0
        } else {
            self.time_exit_count as f64 / self.captured_count as f64
        }
    }

    /// Fold trade outcomes in order. `total_opportunities` counts every
    /// opportunity offered, traded or not.
    pub fn from_outcomes(total_opportunities: usize, outcomes: &[TradeOutcome]) -> Self {
        let mut result = Self {
            total_opportunities,
            captured_count: outcomes.len(),
            ..Self::default()
        };

        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut win_sum = 0.0;
        let mut loss_sum = 0.0;
        let mut equity = 0.0_f64;
        let mut peak = 0.0_f64;

        for outcome in outcomes {
            match outcome.exit_reason {
                ExitReason::TakeProfit => result.take_profit_count += 1,
                ExitReason::StopLoss => result.stop_loss_count += 1,
                ExitReason::Time => result.time_exit_count += 1,
            }
            result.total_profit += outcome.pnl_pct;
            if outcome.pnl_pct > 0.0 {
                wins += 1;
                win_sum += outcome.pnl_pct;
            } else if outcome.pnl_pct < 0.0 {
                losses += 1;
                loss_sum += outcome.pnl_pct;
            }
            equity += outcome.pnl_pct;
            peak = peak.max(equity);
            result.max_drawdown = result.max_drawdown.max(peak - equity);
        }

        if result.captured_count == 0 {
            return result;
        }
        let n = result.captured_count as f64;
        result.avg_profit = result.total_profit / n;
        result.win_rate = wins as f64 / n;
        if wins > 0 {
            result.avg_win = win_sum / wins as f64;
        }
        if losses > 0 {
            result.avg_loss = loss_sum / losses as f64;
        }
        result.profit_ratio = match (wins, losses) {
            (0, _) => 0.0,
            (_, 0) => PROFIT_RATIO_CAP,
            _ => (result.avg_win / result.avg_loss.abs()).min(PROFIT_RATIO_CAP),
        };
        result
    }
}

/// Replay `params` over every opportunity in input order.
pub fn evaluate(
    opportunities: &[Opportunity],
    params: &ParameterSet,
    policy: IntrabarPolicy,
) -> SimulationResult {
    let outcomes: Vec<TradeOutcome> = opportunities
        .iter()
        .filter_map(|opp| simulate(opp, params, policy))
        .collect();
    SimulationResult::from_outcomes(opportunities.len(), &outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(pnl_pct: f64, exit_reason: ExitReason) -> TradeOutcome {
        TradeOutcome {
            pnl_pct,
            exit_reason,
            exit_price: 100.0 + pnl_pct,
            ticks_held: 1,
        }
    }

    #[test]
    fn empty_set_is_all_zero() {
        let r = SimulationResult::from_outcomes(0, &[]);
        assert_eq!(r.capture_rate(), 0.0);
        assert_eq!(r.time_exit_rate(), 0.0);
        assert_eq!(r.avg_profit, 0.0);
        assert_eq!(r.profit_ratio, 0.0);
    }

    #[test]
    fn aggregates_mixed_outcomes() {
        let outs = [
            outcome(2.0, ExitReason::TakeProfit),
            outcome(-1.0, ExitReason::StopLoss),
            outcome(0.5, ExitReason::Time),
            outcome(-0.5, ExitReason::Time),
        ];
        let r = SimulationResult::from_outcomes(5, &outs);
        assert_eq!(r.captured_count, 4);
        assert_eq!(r.take_profit_count, 1);
        assert_eq!(r.stop_loss_count, 1);
        assert_eq!(r.time_exit_count, 2);
        assert!((r.capture_rate() - 0.8).abs() < 1e-12);
        assert!((r.time_exit_rate() - 0.5).abs() < 1e-12);
        assert!((r.avg_profit - 0.25).abs() < 1e-12);
        assert!((r.win_rate - 0.5).abs() < 1e-12);
        assert!((r.avg_win - 1.25).abs() < 1e-12);
        assert!((r.avg_loss + 0.75).abs() < 1e-12);
        assert!((r.profit_ratio - 1.25 / 0.75).abs() < 1e-12);
        // curve: 2, 1, 1.5, 1 -> drawdown 1
        assert!((r.max_drawdown - 1.0).abs() < 1e-12);
    }

    #[test]
    fn no_losses_caps_profit_ratio() {
        let r = SimulationResult::from_outcomes(2, &[outcome(1.0, ExitReason::TakeProfit)]);
        assert_eq!(r.profit_ratio, PROFIT_RATIO_CAP);
    }

    #[test]
    fn huge_ratio_is_capped() {
        let outs = [
            outcome(50.0, ExitReason::TakeProfit),
            outcome(-0.1, ExitReason::StopLoss),
        ];
        let r = SimulationResult::from_outcomes(2, &outs);
        assert_eq!(r.profit_ratio, PROFIT_RATIO_CAP);
    }
}
