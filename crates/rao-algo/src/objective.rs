//! Multi-component objective function.
//!
//! The functional cost is the negative of the worst margin across optimized
//! elements, so lower is better and an overload shows up as a positive cost.
//! Virtual costs are independently pluggable evaluators, each producing a
//! non-negative penalty; they are registered explicitly at construction, not
//! discovered. All components are expressed in the configured unit and the
//! total is their plain sum.

use crate::params::RaoParameters;
use crate::result::ActivationMap;
use crate::sensitivity::SensitivityResult;
use rao_core::{from_megawatt, Cnec, NetworkAction, RaoResult, Unit, UsageLimits};
use serde::Serialize;
use std::collections::BTreeMap;

/// Functional cost, named virtual costs, and the worst element.
///
/// Invariant: `total_cost() = functional_cost + Σ virtual_costs`, with every
/// virtual cost ≥ 0.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectiveFunctionResult {
    pub functional_cost: f64,
    pub virtual_costs: BTreeMap<String, f64>,
    /// Element realizing the minimum margin
    pub most_limiting_cnec: Option<String>,
    pub unit: Unit,
}

impl ObjectiveFunctionResult {
    pub fn total_cost(&self) -> f64 {
        self.functional_cost + self.virtual_cost_sum()
    }

    pub fn virtual_cost_sum(&self) -> f64 {
        self.virtual_costs.values().sum()
    }

    pub fn virtual_cost(&self, name: &str) -> f64 {
        self.virtual_costs.get(name).copied().unwrap_or(0.0)
    }
}

/// Read-only inputs of one evaluation.
pub struct EvaluationContext<'a> {
    pub cnecs: &'a [Cnec],
    pub params: &'a RaoParameters,
    pub limits: &'a UsageLimits,
    pub activated_network_actions: &'a [&'a NetworkAction],
    /// Pre-perimeter setpoints, to tell moved range actions apart
    pub initial_setpoints: &'a BTreeMap<String, f64>,
}

/// One pluggable penalty term.
pub trait VirtualCostEvaluator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Non-negative penalty for the given flows and activations.
    fn evaluate(
        &self,
        flows: &SensitivityResult,
        activations: &ActivationMap,
        ctx: &EvaluationContext,
    ) -> RaoResult<f64>;
}

/// Penalty for monitored-not-optimized elements whose margin decreased more
/// than the acceptable threshold below their pre-perimeter reference.
pub struct MnecViolationCostEvaluator;

impl VirtualCostEvaluator for MnecViolationCostEvaluator {
    fn name(&self) -> &'static str {
        "mnec-cost"
    }

    fn evaluate(
        &self,
        flows: &SensitivityResult,
        _activations: &ActivationMap,
        ctx: &EvaluationContext,
    ) -> RaoResult<f64> {
        let mut cost = 0.0;
        for cnec in ctx.cnecs.iter().filter(|c| c.is_mnec()) {
            let Some(reference) = cnec.initial_flow_mw else {
                continue;
            };
            let flow = flows.reference_flow(&cnec.id)?;
            let decrease = cnec.margin_mw(reference) - cnec.margin_mw(flow);
            let violation_mw =
                (decrease - ctx.params.mnec_acceptable_margin_decrease_mw).max(0.0);
            cost += from_megawatt(violation_mw, ctx.params.objective_unit, cnec.nominal_voltage_kv)
                * ctx.params.mnec_violation_cost;
        }
        Ok(cost)
    }
}

/// Penalty for loop flows beyond their per-element threshold.
pub struct LoopFlowViolationCostEvaluator;

impl VirtualCostEvaluator for LoopFlowViolationCostEvaluator {
    fn name(&self) -> &'static str {
        "loop-flow-cost"
    }

    fn evaluate(
        &self,
        flows: &SensitivityResult,
        _activations: &ActivationMap,
        ctx: &EvaluationContext,
    ) -> RaoResult<f64> {
        let mut cost = 0.0;
        for cnec in ctx.cnecs {
            let Some(threshold) = cnec.loop_flow_threshold_mw else {
                continue;
            };
            let flow = flows.reference_flow(&cnec.id)?;
            let violation_mw = (cnec.loop_flow_mw(flow).abs() - threshold).max(0.0);
            cost += from_megawatt(violation_mw, ctx.params.objective_unit, cnec.nominal_voltage_kv)
                * ctx.params.loop_flow_violation_cost;
        }
        Ok(cost)
    }
}

/// Flat overcost while the branch runs on fallback sensitivity parameters,
/// so a degraded solution never beats an equally good healthy one.
pub struct SensitivityFallbackCostEvaluator;

impl VirtualCostEvaluator for SensitivityFallbackCostEvaluator {
    fn name(&self) -> &'static str {
        "sensitivity-failure-cost"
    }

    fn evaluate(
        &self,
        flows: &SensitivityResult,
        _activations: &ActivationMap,
        ctx: &EvaluationContext,
    ) -> RaoResult<f64> {
        Ok(if flows.fallback {
            ctx.params.sensitivity_failure_overcost
        } else {
            0.0
        })
    }
}

/// Defensive penalty for combinations exceeding usage caps. The search tree
/// enforces the caps up front; a non-zero value here means something slipped
/// through.
pub struct UsageLimitCostEvaluator;

impl VirtualCostEvaluator for UsageLimitCostEvaluator {
    fn name(&self) -> &'static str {
        "usage-limit-cost"
    }

    fn evaluate(
        &self,
        _flows: &SensitivityResult,
        activations: &ActivationMap,
        ctx: &EvaluationContext,
    ) -> RaoResult<f64> {
        let mut per_tso: BTreeMap<&str, usize> = BTreeMap::new();
        let mut total = 0usize;
        let mut topological = 0usize;

        for action in ctx.activated_network_actions {
            *per_tso.entry(action.operator.as_str()).or_default() += 1;
            total += 1;
            if action.is_topological() {
                topological += 1;
            }
        }
        for activation in activations.values() {
            let initial = ctx
                .initial_setpoints
                .get(&activation.action_id)
                .copied()
                .unwrap_or(0.0);
            if (activation.setpoint - initial).abs() > 1e-6 {
                *per_tso.entry(activation.operator.as_str()).or_default() += 1;
                total += 1;
            }
        }

        let mut excess = 0usize;
        if let Some(cap) = ctx.limits.max_remedial_actions {
            excess += total.saturating_sub(cap);
        }
        if let Some(cap) = ctx.limits.max_topological_actions {
            excess += topological.saturating_sub(cap);
        }
        for (tso, used) in per_tso {
            if let Some(cap) = ctx.limits.max_ra_per_tso.get(tso) {
                excess += used.saturating_sub(*cap);
            }
        }
        Ok(excess as f64 * ctx.params.usage_limit_violation_cost)
    }
}

/// Evaluates functional + virtual costs from one flow/activation result.
pub struct ObjectiveFunction {
    unit: Unit,
    evaluators: Vec<Box<dyn VirtualCostEvaluator>>,
}

impl ObjectiveFunction {
    pub fn new(unit: Unit) -> Self {
        Self {
            unit,
            evaluators: Vec::new(),
        }
    }

    /// Register a virtual-cost evaluator.
    pub fn with_evaluator(mut self, evaluator: Box<dyn VirtualCostEvaluator>) -> Self {
        self.evaluators.push(evaluator);
        self
    }

    /// Registry for a given problem: fallback overcost always, the others
    /// only when the inputs can make them non-zero.
    pub fn standard(params: &RaoParameters, cnecs: &[Cnec], limits: &UsageLimits) -> Self {
        let mut objective = Self::new(params.objective_unit)
            .with_evaluator(Box::new(SensitivityFallbackCostEvaluator));
        if cnecs.iter().any(|c| c.is_mnec()) {
            objective = objective.with_evaluator(Box::new(MnecViolationCostEvaluator));
        }
        if cnecs.iter().any(|c| c.loop_flow_threshold_mw.is_some()) {
            objective = objective.with_evaluator(Box::new(LoopFlowViolationCostEvaluator));
        }
        if limits.caps_range_actions() || limits.max_topological_actions.is_some() {
            objective = objective.with_evaluator(Box::new(UsageLimitCostEvaluator));
        }
        objective
    }

    pub fn evaluate(
        &self,
        flows: &SensitivityResult,
        activations: &ActivationMap,
        ctx: &EvaluationContext,
    ) -> RaoResult<ObjectiveFunctionResult> {
        let mut min_margin = f64::INFINITY;
        let mut most_limiting = None;
        for cnec in ctx.cnecs.iter().filter(|c| c.optimized) {
            let flow = flows.reference_flow(&cnec.id)?;
            let margin = cnec.margin(flow, self.unit);
            if margin < min_margin {
                min_margin = margin;
                most_limiting = Some(cnec.id.clone());
            }
        }
        let functional_cost = if min_margin.is_finite() {
            -min_margin
        } else {
            0.0
        };

        let mut virtual_costs = BTreeMap::new();
        for evaluator in &self.evaluators {
            let cost = evaluator.evaluate(flows, activations, ctx)?.max(0.0);
            virtual_costs.insert(evaluator.name().to_string(), cost);
        }

        Ok(ObjectiveFunctionResult {
            functional_cost,
            virtual_costs,
            most_limiting_cnec: most_limiting,
            unit: self.unit,
        })
    }
}
