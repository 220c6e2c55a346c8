//! Property tests for simulator invariants.
//!
//! Uses proptest to verify:
//! 1. Determinism: identical inputs give byte-identical results
//! 2. Exit consistency: TP pays the target, SL loses at most the stop
//! 3. Gate monotonicity: raising a floor never raises the capture rate
//! 4. Scalping scenario: fast movers hit target, laggards time out flat

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use sigopt_core::domain::{
    Direction, Opportunity, ParameterSet, ParameterSetRecord, SignalType, Tick,
};
use sigopt_core::{evaluate, simulate, ExitReason, IntrabarPolicy};

// ── Strategies (proptest) ────────────────────────────────────────────

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Random-walk path of `len` ticks starting at 100.
fn arb_path(max_len: usize) -> impl Strategy<Value = Vec<Tick>> {
    prop::collection::vec((-0.02..0.02_f64, 0.0..0.01_f64, 0.0..0.01_f64), 0..max_len).prop_map(
        |steps| {
            let mut prev = 100.0_f64;
            steps
                .into_iter()
                .map(|(ret, up, down)| {
                    let open = prev;
                    let close = prev * (1.0 + ret);
                    prev = close;
                    Tick {
                        open,
                        high: open.max(close) * (1.0 + up),
                        low: open.min(close) * (1.0 - down),
                        close,
                    }
                })
                .collect()
        },
    )
}

fn arb_opportunity() -> impl Strategy<Value = Opportunity> {
    (
        arb_path(40),
        any::<bool>(),
        0.2..3.0_f64,
        0.0..100.0_f64,
        0u32..5,
        0u32..200,
    )
        .prop_map(|(forward, long, atr, score, consensus, minute)| Opportunity {
            symbol: "BTC".into(),
            timestamp: t0() + Duration::minutes(15 * i64::from(minute)),
            signal_type: SignalType::Scalping,
            direction: if long { Direction::Long } else { Direction::Short },
            entry_price: 100.0,
            atr,
            support: 96.0,
            resistance: 104.0,
            objective_profit: 2.0,
            time_to_target: 1,
            signal_score: score,
            indicator_consensus: consensus,
            forward,
        })
}

fn arb_params() -> impl Strategy<Value = ParameterSet> {
    (0.05..2.0_f64, 0.0..80.0_f64, 0u32..4, 0.3..3.0_f64, 0.3..5.0_f64, 1u32..48).prop_map(
        |(rr, score, consensus, stop, tp, hold)| {
            ParameterSet::new(ParameterSetRecord {
                min_risk_reward: rr,
                min_signal_score: score,
                min_indicator_consensus: consensus,
                atr_stop_multiplier: stop,
                atr_tp_multiplier: tp,
                max_holding_periods: hold,
            })
            .unwrap()
        },
    )
}

fn arb_policy() -> impl Strategy<Value = IntrabarPolicy> {
    prop_oneof![
        Just(IntrabarPolicy::WorstCase),
        Just(IntrabarPolicy::BestCase),
        Just(IntrabarPolicy::OhlcOrder),
    ]
}

fn with_record(params: &ParameterSet, edit: impl FnOnce(&mut ParameterSetRecord)) -> ParameterSet {
    let mut rec = params.record();
    edit(&mut rec);
    ParameterSet::new(rec).unwrap()
}

// ── 1. Determinism ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn evaluation_is_deterministic(
        opps in prop::collection::vec(arb_opportunity(), 0..20),
        params in arb_params(),
        policy in arb_policy(),
    ) {
        let a = serde_json::to_string(&evaluate(&opps, &params, policy)).unwrap();
        let b = serde_json::to_string(&evaluate(&opps, &params, policy)).unwrap();
        prop_assert_eq!(a, b);
    }
}

// ── 2. Exit consistency ──────────────────────────────────────────────

proptest! {
    #[test]
    fn exit_reason_matches_pnl(
        opp in arb_opportunity(),
        params in arb_params(),
        policy in arb_policy(),
    ) {
        if let Some(out) = simulate(&opp, &params, policy) {
            let target_pct = opp.atr * params.atr_tp_multiplier() / opp.entry_price * 100.0;
            let stop_pct = opp.atr * params.atr_stop_multiplier() / opp.entry_price * 100.0;
            match out.exit_reason {
                ExitReason::TakeProfit => {
                    prop_assert!(out.pnl_pct > 0.0);
                    prop_assert!((out.pnl_pct - target_pct).abs() < 1e-9);
                }
                ExitReason::StopLoss => {
                    prop_assert!(out.pnl_pct < 0.0);
                    prop_assert!(out.pnl_pct.abs() <= stop_pct + 1e-9);
                }
                ExitReason::Time => {
                    prop_assert!(out.ticks_held <= params.max_holding_periods() as usize);
                    prop_assert!(out.ticks_held <= opp.forward.len());
                }
            }
        }
    }
}

// ── 3. Gate monotonicity ─────────────────────────────────────────────

proptest! {
    #[test]
    fn capture_rate_non_increasing_in_signal_score(
        opps in prop::collection::vec(arb_opportunity(), 1..20),
        params in arb_params(),
        bump in 0.0..50.0_f64,
    ) {
        let stricter = with_record(&params, |r| r.min_signal_score += bump);
        let base = evaluate(&opps, &params, IntrabarPolicy::WorstCase);
        let strict = evaluate(&opps, &stricter, IntrabarPolicy::WorstCase);
        prop_assert!(strict.capture_rate() <= base.capture_rate());
    }

    #[test]
    fn capture_rate_non_increasing_in_consensus(
        opps in prop::collection::vec(arb_opportunity(), 1..20),
        params in arb_params(),
        bump in 0u32..4,
    ) {
        let stricter = with_record(&params, |r| r.min_indicator_consensus += bump);
        let base = evaluate(&opps, &params, IntrabarPolicy::WorstCase);
        let strict = evaluate(&opps, &stricter, IntrabarPolicy::WorstCase);
        prop_assert!(strict.capture_rate() <= base.capture_rate());
    }
}

// ── 4. Scalping scenario ─────────────────────────────────────────────

fn scenario_opportunity(i: i64, fast: bool) -> Opportunity {
    let forward: Vec<Tick> = if fast {
        // reaches +1.6% by the fourth tick
        (1..=4)
            .map(|k| {
                let close = 100.0 + 0.4 * k as f64;
                Tick { open: close - 0.4, high: close + 0.2, low: close - 0.5, close }
            })
            .collect()
    } else {
        (0..24)
            .map(|_| Tick { open: 100.0, high: 100.3, low: 99.8, close: 100.0 })
            .collect()
    };
    Opportunity {
        symbol: "BTC".into(),
        timestamp: t0() + Duration::minutes(15 * i),
        signal_type: SignalType::Scalping,
        direction: Direction::Long,
        entry_price: 100.0,
        atr: 1.0,
        support: 97.0,
        resistance: 105.0,
        objective_profit: if fast { 1.8 } else { 0.3 },
        time_to_target: if fast { 4 } else { 24 },
        signal_score: 55.0,
        indicator_consensus: 1,
        forward,
    }
}

#[test]
fn ten_scalping_opportunities_scenario() {
    // GIVEN six fast movers and four that never reach 1.5% in 24 ticks
    let opps: Vec<Opportunity> = (0..10).map(|i| scenario_opportunity(i, i < 6)).collect();

    // WHEN replayed without gating at tp=0.5, stop=0.8, hold=24
    let params = ParameterSet::new(ParameterSetRecord {
        min_risk_reward: 0.01,
        min_signal_score: 0.0,
        min_indicator_consensus: 0,
        atr_stop_multiplier: 0.8,
        atr_tp_multiplier: 0.5,
        max_holding_periods: 24,
    })
    .unwrap();
    let result = evaluate(&opps, &params, IntrabarPolicy::WorstCase);

    // THEN everything is captured, at most the laggards time out, and it pays
    assert_eq!(result.captured_count, 10);
    assert!(result.time_exit_count <= 4);
    assert!(result.avg_profit > 0.0);
    assert_eq!(result.take_profit_count, 6);
}
