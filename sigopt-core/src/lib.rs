//! SigOpt Core: domain types, opportunity identification, trade simulation.
//!
//! This crate is pure (no I/O):
//! - Domain types (snapshots, opportunities, parameter sets, run ids)
//! - Opportunity identifier over per-symbol snapshot series
//! - Deterministic trade outcome simulator with configurable intrabar policy
//! - Aggregation of outcomes into a `SimulationResult`
//! - BLAKE3-derived RNG hierarchy for reproducible perturbations

pub mod domain;
pub mod evaluation;
pub mod identifier;
pub mod rng;
pub mod simulator;

pub use evaluation::{evaluate, SimulationResult};
pub use identifier::{identify_all, identify_opportunities, IdentifyReport, OpportunityConfig};
pub use simulator::{simulate, ExitReason, IntrabarPolicy, TradeOutcome};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared with rayon workers is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::MarketSnapshot>();
        require_sync::<domain::MarketSnapshot>();
        require_send::<domain::Opportunity>();
        require_sync::<domain::Opportunity>();
        require_send::<domain::ParameterSet>();
        require_sync::<domain::ParameterSet>();
        require_send::<domain::ParameterDelta>();
        require_sync::<domain::ParameterDelta>();
        require_send::<domain::RunId>();
        require_sync::<domain::RunId>();

        require_send::<SimulationResult>();
        require_sync::<SimulationResult>();
        require_send::<IntrabarPolicy>();
        require_sync::<IntrabarPolicy>();
        require_send::<OpportunityConfig>();
        require_sync::<OpportunityConfig>();

        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
    }

    #[test]
    fn simulation_results_are_byte_identical_across_runs() {
        use chrono::NaiveDate;
        use domain::{Direction, Opportunity, ParameterSet, ParameterSetRecord, SignalType, Tick};

        let opp = Opportunity {
            symbol: "BTC".into(),
            timestamp: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            signal_type: SignalType::Swing,
            direction: Direction::Long,
            entry_price: 100.0,
            atr: 1.3,
            support: 95.0,
            resistance: 108.0,
            objective_profit: 4.0,
            time_to_target: 3,
            signal_score: 66.0,
            indicator_consensus: 2,
            forward: vec![
                Tick { open: 100.0, high: 101.1, low: 99.4, close: 100.9 },
                Tick { open: 100.9, high: 102.2, low: 100.1, close: 101.8 },
                Tick { open: 101.8, high: 104.3, low: 101.0, close: 104.0 },
            ],
        };
        let params = ParameterSet::new(ParameterSetRecord {
            min_risk_reward: 1.0,
            min_signal_score: 60.0,
            min_indicator_consensus: 2,
            atr_stop_multiplier: 1.5,
            atr_tp_multiplier: 2.5,
            max_holding_periods: 60,
        })
        .unwrap();

        let opps = vec![opp; 5];
        let a = serde_json::to_string(&evaluate(&opps, &params, IntrabarPolicy::default())).unwrap();
        let b = serde_json::to_string(&evaluate(&opps, &params, IntrabarPolicy::default())).unwrap();
        assert_eq!(a, b);
    }
}
