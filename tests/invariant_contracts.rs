//! Contract tests: each engine path must actually check the invariants that
//! protect it. The invariant log is per thread, so everything here runs on a
//! current-thread runtime.

use crabstream::invariant_ppt::{
    clear_invariant_log, contract_test, invariant_check_count, invariants,
};
use crabstream::probe::{StaticCapabilities, ThresholdClassifier};
use crabstream::testing::{ScriptStep, ScriptedTransport};
use crabstream::{
    AttemptRecord, CapabilitySet, DeliveryEngine, EngineConfig, MetricsSnapshot, MetricsStore,
    NetworkCondition, NetworkSample, Selector, Strategy, StrategyCatalog,
};
use std::sync::Arc;

#[test]
fn contract_catalog_registration() {
    clear_invariant_log();
    let mut catalog = StrategyCatalog::new();
    catalog.register(Strategy::new("direct", 1, 1000, 1)).unwrap();
    catalog.register(Strategy::new("proxy", 2, 1000, 1)).unwrap();

    contract_test("catalog registration", &[invariants::CATALOG_NAMES_UNIQUE]);
    assert_eq!(invariant_check_count(invariants::CATALOG_NAMES_UNIQUE), 2);
}

#[test]
fn contract_metrics_recording() {
    clear_invariant_log();
    let store = MetricsStore::default();
    store.record_attempt(AttemptRecord::success("direct", 1, 5, 0));

    contract_test(
        "metrics recording",
        &[invariants::SUCCESS_RATE_BOUNDED, invariants::HISTORY_BOUNDED],
    );
}

#[test]
fn contract_selection() {
    clear_invariant_log();
    let catalog = StrategyCatalog::from_strategies(vec![Strategy::new("direct", 1, 1000, 1)])
        .unwrap();
    Selector::default()
        .select_order(
            &catalog,
            &CapabilitySet::all(),
            NetworkCondition::Fast,
            &MetricsSnapshot::default(),
        )
        .unwrap();

    contract_test("selection", &[invariants::PLAN_ONLY_AVAILABLE]);
}

#[tokio::test(start_paused = true)]
async fn contract_full_delivery() {
    clear_invariant_log();
    let engine = DeliveryEngine::new(
        EngineConfig::default(),
        Arc::new(StaticCapabilities(CapabilitySet::all())),
        Arc::new(ThresholdClassifier::default()),
    )
    .unwrap();
    let transport = ScriptedTransport::new()
        .with_script("webrtc", vec![ScriptStep::Hang])
        .with_script("webrtc", vec![ScriptStep::ok()]);

    let delivered = engine
        .deliver(&NetworkSample::default(), |s, ctx| transport.operation(s, ctx))
        .await
        .unwrap();
    assert_eq!(delivered.attempt, 2);

    contract_test(
        "full delivery",
        &[
            invariants::CATALOG_NAMES_UNIQUE,
            invariants::PLAN_ONLY_AVAILABLE,
            invariants::ATTEMPT_RESOLVED_ONCE,
            invariants::SUCCESS_RATE_BOUNDED,
            invariants::HISTORY_BOUNDED,
        ],
    );
    assert_eq!(invariant_check_count(invariants::ATTEMPT_RESOLVED_ONCE), 2);
}
