//! Search-tree leaves.
//!
//! A leaf is one candidate combination of network actions. Evaluating it
//! applies the combination to an exclusive clone of the root network state,
//! then runs the full range-action optimization on top. Everything a leaf
//! needs is read-only and shared; everything it mutates is owned.

use crate::objective::ObjectiveFunction;
use crate::optimizer::{OptimizationOutcome, RangeActionOptimizer};
use crate::params::RaoParameters;
use crate::sensitivity::SensitivityEngine;
use rao_core::{Cnec, NetworkAction, NetworkState, RangeAction, RaoError, RaoResult, UsageLimits};
use std::collections::BTreeSet;
use std::time::Instant;

/// Canonical identity of a leaf: the unordered set of its network-action
/// ids. Two leaves with the same set are the same exploration point.
pub type ActionIdSet = BTreeSet<String>;

/// Lifecycle of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafStatus {
    Created,
    Evaluated,
    Pruned,
    Expanded,
}

/// One node of the search tree.
#[derive(Debug, Clone)]
pub struct Leaf {
    pub actions: ActionIdSet,
    pub depth: usize,
    pub status: LeafStatus,
    pub evaluation: Option<LeafEvaluation>,
}

impl Leaf {
    /// The root leaf: empty action set.
    pub fn root() -> Self {
        Self {
            actions: ActionIdSet::new(),
            depth: 0,
            status: LeafStatus::Created,
            evaluation: None,
        }
    }

    /// Child of `parent` with exactly one more network action.
    pub fn child(parent: &Leaf, action_id: &str) -> Self {
        let mut actions = parent.actions.clone();
        actions.insert(action_id.to_string());
        Self {
            actions,
            depth: parent.depth + 1,
            status: LeafStatus::Created,
            evaluation: None,
        }
    }

    pub fn mark_evaluated(&mut self, evaluation: LeafEvaluation) {
        self.status = LeafStatus::Evaluated;
        self.evaluation = Some(evaluation);
    }

    pub fn total_cost(&self) -> Option<f64> {
        self.evaluation
            .as_ref()
            .map(|e| e.outcome.objective.total_cost())
    }

    /// Sorted action ids, for reporting.
    pub fn action_list(&self) -> Vec<String> {
        self.actions.iter().cloned().collect()
    }
}

/// Result of one evaluated leaf.
#[derive(Debug, Clone)]
pub struct LeafEvaluation {
    pub outcome: OptimizationOutcome,
    /// The branch ran on fallback sensitivity parameters at some point
    pub fallback: bool,
    pub eval_time_ms: u128,
    /// Post-optimization state, the starting point if this leaf gets
    /// expanded
    pub state: NetworkState,
}

/// Shared read-only inputs of every leaf evaluation in one search run.
pub struct LeafContext<'a> {
    pub cnecs: &'a [Cnec],
    pub range_actions: &'a [RangeAction],
    pub network_actions: &'a [NetworkAction],
    pub limits: &'a UsageLimits,
    pub params: &'a RaoParameters,
    pub objective: &'a ObjectiveFunction,
}

impl LeafContext<'_> {
    pub fn network_action(&self, id: &str) -> RaoResult<&NetworkAction> {
        self.network_actions
            .iter()
            .find(|na| na.id == id)
            .ok_or_else(|| RaoError::UnknownElement(format!("network action {id}")))
    }
}

/// Apply a leaf's action set to an exclusive state clone and optimize.
///
/// Failures are returned to the caller, which turns them into a discarded
/// leaf; they never abort sibling evaluations.
pub fn evaluate_leaf(
    ctx: &LeafContext<'_>,
    actions: &ActionIdSet,
    mut state: NetworkState,
    mut sensitivity: SensitivityEngine,
) -> RaoResult<LeafEvaluation> {
    let start = Instant::now();

    let activated: Vec<&NetworkAction> = actions
        .iter()
        .map(|id| ctx.network_action(id))
        .collect::<RaoResult<_>>()?;
    for action in &activated {
        action.apply(&mut state);
    }

    let optimizer = RangeActionOptimizer {
        cnecs: ctx.cnecs,
        range_actions: ctx.range_actions,
        limits: ctx.limits,
        params: ctx.params,
        objective: ctx.objective,
        activated_network_actions: &activated,
    };
    let outcome = optimizer.optimize(&mut state, &mut sensitivity)?;

    Ok(LeafEvaluation {
        fallback: sensitivity.in_fallback(),
        outcome,
        eval_time_ms: start.elapsed().as_millis(),
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SensitivityParameters;
    use crate::sensitivity::{SensitivityError, SensitivityProvider, SensitivityResult};
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Provider returning flat flows, shifted down when "na-relief" has
    /// opened its switch.
    struct SwitchAwareProvider;

    impl SensitivityProvider for SwitchAwareProvider {
        fn compute(
            &self,
            state: &NetworkState,
            cnecs: &[Cnec],
            _range_actions: &[RangeAction],
            _params: &SensitivityParameters,
        ) -> Result<SensitivityResult, SensitivityError> {
            let relief = state.switch_closed("relief-line") == Some(false);
            let flows: HashMap<String, f64> = cnecs
                .iter()
                .map(|c| (c.id.clone(), if relief { 400.0 } else { 600.0 }))
                .collect();
            Ok(SensitivityResult::new(flows, HashMap::new()))
        }
    }

    #[test]
    fn test_leaf_applies_actions_before_optimizing() {
        let cnecs = vec![Cnec::optimized("cnec-1", "TSO1", 750.0)];
        let network_actions = vec![NetworkAction {
            id: "na-relief".into(),
            operator: "TSO1".into(),
            kind: rao_core::NetworkActionKind::OpenSwitch {
                element: "relief-line".into(),
            },
            usage_rules: vec![rao_core::UsageRule::Free],
        }];
        let limits = UsageLimits::default();
        let params = RaoParameters::default();
        let objective = ObjectiveFunction::standard(&params, &cnecs, &limits);
        let ctx = LeafContext {
            cnecs: &cnecs,
            range_actions: &[],
            network_actions: &network_actions,
            limits: &limits,
            params: &params,
            objective: &objective,
        };
        let engine = SensitivityEngine::new(
            Arc::new(SwitchAwareProvider),
            SensitivityParameters::default(),
            None,
        );

        let root = evaluate_leaf(
            &ctx,
            &ActionIdSet::new(),
            NetworkState::new(),
            engine.fresh_branch(),
        )
        .unwrap();
        assert!((root.outcome.objective.total_cost() - (-150.0)).abs() < 1e-9);

        let set: ActionIdSet = ["na-relief".to_string()].into_iter().collect();
        let child =
            evaluate_leaf(&ctx, &set, NetworkState::new(), engine.fresh_branch()).unwrap();
        assert!((child.outcome.objective.total_cost() - (-350.0)).abs() < 1e-9);
        assert_eq!(child.state.switch_closed("relief-line"), Some(false));
    }

    #[test]
    fn test_unknown_action_id_is_an_error() {
        let cnecs = vec![Cnec::optimized("cnec-1", "TSO1", 750.0)];
        let limits = UsageLimits::default();
        let params = RaoParameters::default();
        let objective = ObjectiveFunction::standard(&params, &cnecs, &limits);
        let ctx = LeafContext {
            cnecs: &cnecs,
            range_actions: &[],
            network_actions: &[],
            limits: &limits,
            params: &params,
            objective: &objective,
        };
        let engine = SensitivityEngine::new(
            Arc::new(SwitchAwareProvider),
            SensitivityParameters::default(),
            None,
        );

        let set: ActionIdSet = ["ghost".to_string()].into_iter().collect();
        let err = evaluate_leaf(&ctx, &set, NetworkState::new(), engine).unwrap_err();
        assert!(matches!(err, RaoError::UnknownElement(_)));
    }
}
