//! End-to-end tests of the range-action convergence loop.

use rao_algo::{
    ObjectiveFunction, RangeActionOptimizer, RaoParameters, SensitivityEngine, SensitivityError,
    SensitivityParameters, SensitivityProvider, SensitivityResult,
};
use rao_core::{Cnec, NetworkState, RangeAction, RangeActionKind, TapToAngle, UsageLimits};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Exactly linear grid: flows respond to the PST angle with constant
/// factors, so the LP model matches the "real" network perfectly.
struct LinearGridProvider {
    base_flows: Vec<(String, f64)>,
    factors: Vec<(String, String, f64)>,
}

impl SensitivityProvider for LinearGridProvider {
    fn compute(
        &self,
        state: &NetworkState,
        _cnecs: &[Cnec],
        range_actions: &[RangeAction],
        _params: &SensitivityParameters,
    ) -> Result<SensitivityResult, SensitivityError> {
        let mut flows: HashMap<String, f64> = self.base_flows.iter().cloned().collect();
        for ra in range_actions {
            let setpoint = ra.current_setpoint(state);
            for (ra_id, cnec_id, factor) in &self.factors {
                if ra_id == &ra.id {
                    *flows.entry(cnec_id.clone()).or_insert(0.0) += factor * setpoint;
                }
            }
        }
        Ok(SensitivityResult::new(
            flows,
            self.factors
                .iter()
                .map(|(ra, c, v)| ((ra.clone(), c.clone()), *v))
                .collect(),
        ))
    }
}

/// Fails its first computation, then behaves like a linear grid.
struct FailOnceProvider {
    inner: LinearGridProvider,
    calls: AtomicUsize,
}

impl SensitivityProvider for FailOnceProvider {
    fn compute(
        &self,
        state: &NetworkState,
        cnecs: &[Cnec],
        range_actions: &[RangeAction],
        params: &SensitivityParameters,
    ) -> Result<SensitivityResult, SensitivityError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(SensitivityError::Diverged("first call fails".into()));
        }
        self.inner.compute(state, cnecs, range_actions, params)
    }
}

fn two_cnec_fixture() -> (Vec<Cnec>, Vec<RangeAction>, UsageLimits, RaoParameters) {
    let cnecs = vec![
        Cnec::optimized("cnec-1", "TSO1", 750.0),
        Cnec::optimized("cnec-2", "TSO1", 750.0),
    ];
    let range_actions = vec![RangeAction {
        id: "pst-1".into(),
        operator: "TSO1".into(),
        kind: RangeActionKind::PstTap(TapToAngle {
            min_tap: -16,
            max_tap: 16,
            angle_step_deg: 1.0,
        }),
    }];
    (
        cnecs,
        range_actions,
        UsageLimits::default(),
        RaoParameters::default(),
    )
}

fn linear_provider() -> LinearGridProvider {
    LinearGridProvider {
        base_flows: vec![("cnec-1".into(), 500.0), ("cnec-2".into(), 300.0)],
        factors: vec![
            ("pst-1".into(), "cnec-1".into(), 2.0),
            ("pst-1".into(), "cnec-2".into(), 5.0),
        ],
    }
}

#[test]
fn finds_margin_maximizing_tap_within_two_iterations() {
    let (cnecs, range_actions, limits, params) = two_cnec_fixture();
    let objective = ObjectiveFunction::standard(&params, &cnecs, &limits);
    let optimizer = RangeActionOptimizer {
        cnecs: &cnecs,
        range_actions: &range_actions,
        limits: &limits,
        params: &params,
        objective: &objective,
        activated_network_actions: &[],
    };
    let mut engine = SensitivityEngine::new(
        Arc::new(linear_provider()),
        params.sensitivity.clone(),
        None,
    );
    let mut state = NetworkState::new();

    let outcome = optimizer.optimize(&mut state, &mut engine).unwrap();

    // min(750 - flow1, 750 - flow2) is maximized on the tap bound: flows
    // become 468 and 220, worst margin 282 on cnec-1
    assert_eq!(outcome.activations["pst-1"].tap, Some(-16));
    assert!(outcome.iterations <= 2);
    assert!((outcome.objective.functional_cost - (-282.0)).abs() < 1e-6);
    assert_eq!(
        outcome.objective.most_limiting_cnec.as_deref(),
        Some("cnec-1")
    );
    // the state carries the optimized tap
    assert_eq!(state.pst_tap("pst-1"), Some(-16));
}

#[test]
fn fallback_retry_tags_result_and_adds_overcost() {
    let (cnecs, range_actions, limits, mut params) = two_cnec_fixture();
    params.fallback_sensitivity = Some(SensitivityParameters {
        timeout_seconds: 60,
        ..SensitivityParameters::default()
    });
    let objective = ObjectiveFunction::standard(&params, &cnecs, &limits);
    let optimizer = RangeActionOptimizer {
        cnecs: &cnecs,
        range_actions: &range_actions,
        limits: &limits,
        params: &params,
        objective: &objective,
        activated_network_actions: &[],
    };
    let mut engine = SensitivityEngine::new(
        Arc::new(FailOnceProvider {
            inner: linear_provider(),
            calls: AtomicUsize::new(0),
        }),
        params.sensitivity.clone(),
        params.fallback_sensitivity.clone(),
    );
    let mut state = NetworkState::new();

    let outcome = optimizer.optimize(&mut state, &mut engine).unwrap();

    assert!(outcome.sensitivity.fallback);
    assert!(engine.in_fallback());
    let overcost = outcome.objective.virtual_cost("sensitivity-failure-cost");
    assert!(overcost > 0.0);
    assert_eq!(overcost, params.sensitivity_failure_overcost);
    // invariant: total = functional + Σ virtual
    assert!(
        (outcome.objective.total_cost()
            - (outcome.objective.functional_cost + outcome.objective.virtual_cost_sum()))
        .abs()
            < 1e-12
    );
    // the optimization itself still works on fallback parameters
    assert_eq!(outcome.activations["pst-1"].tap, Some(-16));
}

#[test]
fn failure_without_fallback_parameters_is_fatal() {
    let (cnecs, range_actions, limits, params) = two_cnec_fixture();
    let objective = ObjectiveFunction::standard(&params, &cnecs, &limits);
    let optimizer = RangeActionOptimizer {
        cnecs: &cnecs,
        range_actions: &range_actions,
        limits: &limits,
        params: &params,
        objective: &objective,
        activated_network_actions: &[],
    };
    let mut engine = SensitivityEngine::new(
        Arc::new(FailOnceProvider {
            inner: linear_provider(),
            calls: AtomicUsize::new(0),
        }),
        params.sensitivity.clone(),
        None,
    );
    let mut state = NetworkState::new();

    let err = optimizer.optimize(&mut state, &mut engine).unwrap_err();
    assert!(err.to_string().contains("Sensitivity computation failed"));
}
