//! Range-action convergence loop.
//!
//! Fixed-point iteration over a piecewise-linear approximation of a
//! non-linear problem: each pass solves the LP at the current linearization
//! point, applies the rounded setpoints, and re-runs the sensitivity
//! computation. Tap discretization and re-linearization can both reintroduce
//! small violations, which is exactly why the loop exists. Convergence to
//! the global optimum is not guaranteed, only to a local fixed point within
//! `max_iterations`.
//!
//! The best result is non-increasing in cost by construction: candidates are
//! adopted only when strictly better, and a regression stops the loop with
//! the previous best (a correctly linearized model should improve
//! monotonically, so a regression is an anomaly worth a warning, not an
//! error).

use crate::linear::{default_fillers, FillerContext, LinearOptimizationEngine};
use crate::objective::{EvaluationContext, ObjectiveFunction, ObjectiveFunctionResult};
use crate::params::RaoParameters;
use crate::result::{same_activations, ActivationMap, RangeActionActivation};
use crate::sensitivity::{SensitivityEngine, SensitivityResult};
use rao_core::{Cnec, NetworkAction, NetworkState, RangeAction, RaoResult, UsageLimits};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Best activation found by one optimization, with the flows and objective
/// backing it.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub activations: ActivationMap,
    pub objective: ObjectiveFunctionResult,
    pub sensitivity: SensitivityResult,
    /// Iteration that produced the best result (0 = pre-optimization)
    pub iterations: usize,
}

/// The sensitivity/LP alternation for one leaf.
pub struct RangeActionOptimizer<'a> {
    pub cnecs: &'a [Cnec],
    pub range_actions: &'a [RangeAction],
    pub limits: &'a UsageLimits,
    pub params: &'a RaoParameters,
    pub objective: &'a ObjectiveFunction,
    pub activated_network_actions: &'a [&'a NetworkAction],
}

impl RangeActionOptimizer<'_> {
    /// Current schedule of all range actions as recorded in `state`.
    fn schedule_from_state(&self, state: &NetworkState) -> ActivationMap {
        self.range_actions
            .iter()
            .map(|ra| {
                let setpoint = ra.current_setpoint(state);
                (
                    ra.id.clone(),
                    RangeActionActivation {
                        action_id: ra.id.clone(),
                        operator: ra.operator.clone(),
                        setpoint,
                        tap: ra.tap_for(setpoint),
                    },
                )
            })
            .collect()
    }

    fn apply_schedule(&self, state: &mut NetworkState, schedule: &ActivationMap) {
        for ra in self.range_actions {
            if let Some(activation) = schedule.get(&ra.id) {
                ra.apply(state, activation.setpoint);
            }
        }
    }

    /// Optimize the continuous actions on `state`, leaving the state at the
    /// best found setpoints.
    pub fn optimize(
        &self,
        state: &mut NetworkState,
        sensitivity: &mut SensitivityEngine,
    ) -> RaoResult<OptimizationOutcome> {
        let mut engine = LinearOptimizationEngine::new(default_fillers(self.cnecs, self.limits));

        let mut sensi = sensitivity.evaluate(state, self.cnecs, self.range_actions)?;
        let initial_setpoints: BTreeMap<String, f64> = self
            .range_actions
            .iter()
            .map(|ra| (ra.id.clone(), ra.current_setpoint(state)))
            .collect();
        let mut reference_setpoints = initial_setpoints.clone();

        let eval_ctx = EvaluationContext {
            cnecs: self.cnecs,
            params: self.params,
            limits: self.limits,
            activated_network_actions: self.activated_network_actions,
            initial_setpoints: &initial_setpoints,
        };

        let pre_schedule = self.schedule_from_state(state);
        let mut best = OptimizationOutcome {
            objective: self.objective.evaluate(&sensi, &pre_schedule, &eval_ctx)?,
            activations: pre_schedule.clone(),
            sensitivity: sensi.clone(),
            iterations: 0,
        };
        let mut previous = pre_schedule;

        for iteration in 1..=self.params.max_iterations {
            let filler_ctx = FillerContext {
                cnecs: self.cnecs,
                range_actions: self.range_actions,
                params: self.params,
                initial_setpoints: &initial_setpoints,
                reference_setpoints: &reference_setpoints,
                limits: self.limits,
                activated_network_actions: self.activated_network_actions,
            };
            let candidate = engine.run(&sensi, &filler_ctx)?;

            if same_activations(&previous, &candidate) {
                debug!(iteration, "range-action set unchanged, optimum reached");
                break;
            }

            self.apply_schedule(state, &candidate);
            reference_setpoints = candidate
                .iter()
                .map(|(id, act)| (id.clone(), act.setpoint))
                .collect();
            sensi = sensitivity.evaluate(state, self.cnecs, self.range_actions)?;

            let objective = self.objective.evaluate(&sensi, &candidate, &eval_ctx)?;
            if objective.total_cost() < best.objective.total_cost() {
                debug!(
                    iteration,
                    cost = objective.total_cost(),
                    "adopting improved range-action result"
                );
                best = OptimizationOutcome {
                    activations: candidate.clone(),
                    objective,
                    sensitivity: sensi.clone(),
                    iterations: iteration,
                };
                previous = candidate;
            } else {
                warn!(
                    iteration,
                    best_cost = best.objective.total_cost(),
                    candidate_cost = objective.total_cost(),
                    "objective regressed under the linearized model, keeping previous result"
                );
                self.apply_schedule(state, &best.activations);
                break;
            }
        }

        Ok(best)
    }
}
