//! Problem fillers.
//!
//! Each filler contributes the variables and constraints of one concern to a
//! shared [`LinearProblem`]: core flow/range-action variables, min-margin
//! maximization, loop-flow limitation, MNEC limitation, usage-limit
//! counting. Fillers are applied in a fixed declared order because later
//! fillers reference variables created by earlier ones; resolving a missing
//! variable fails fast with a named error instead of silently creating a
//! duplicate.
//!
//! `fill` builds the concern from scratch; `update` rewrites coefficients
//! and bounds in place after a new sensitivity computation, reusing variable
//! identities.

use crate::linear::problem::{ConRef, LinearProblem, VarRef};
use crate::params::RaoParameters;
use crate::sensitivity::SensitivityResult;
use rao_core::{megawatt_per_unit, Cnec, NetworkAction, RangeAction, RaoResult, UsageLimits};
use std::collections::BTreeMap;

/// Shared read-only inputs of one fill/update pass.
pub struct FillerContext<'a> {
    pub cnecs: &'a [Cnec],
    pub range_actions: &'a [RangeAction],
    pub params: &'a RaoParameters,
    /// Setpoints at leaf start; reference for the movement penalty
    pub initial_setpoints: &'a BTreeMap<String, f64>,
    /// Setpoints at the last sensitivity linearization point
    pub reference_setpoints: &'a BTreeMap<String, f64>,
    pub limits: &'a UsageLimits,
    /// Network actions already activated on this branch
    pub activated_network_actions: &'a [&'a NetworkAction],
}

impl<'a> FillerContext<'a> {
    fn initial_setpoint(&self, ra: &RangeAction) -> f64 {
        self.initial_setpoints.get(&ra.id).copied().unwrap_or(0.0)
    }

    fn reference_setpoint(&self, ra: &RangeAction) -> f64 {
        self.reference_setpoints.get(&ra.id).copied().unwrap_or(0.0)
    }
}

/// One concern of the linear problem.
pub trait ProblemFiller: Send + Sync {
    fn name(&self) -> &'static str;

    /// First build: create this concern's variables and constraints.
    fn fill(
        &self,
        lp: &mut LinearProblem,
        sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()>;

    /// Incremental rebuild after a new sensitivity computation.
    fn update(
        &self,
        lp: &mut LinearProblem,
        sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()>;
}

fn needs_flow_variable(cnec: &Cnec) -> bool {
    cnec.optimized || cnec.monitored || cnec.loop_flow_threshold_mw.is_some()
}

/// Right-hand side of a flow-definition constraint:
/// `refFlow − Σ sensi × refSetpoint`.
fn flow_definition_rhs(
    cnec: &Cnec,
    sensi: &SensitivityResult,
    ctx: &FillerContext,
) -> RaoResult<f64> {
    let mut rhs = sensi.reference_flow(&cnec.id)?;
    for ra in ctx.range_actions {
        rhs -= sensi.sensitivity(&ra.id, &cnec.id) * ctx.reference_setpoint(ra);
    }
    Ok(rhs)
}

/// Flow variables, flow definitions, setpoint and absolute-variation
/// variables. Must run first.
pub struct CoreProblemFiller;

impl ProblemFiller for CoreProblemFiller {
    fn name(&self) -> &'static str {
        "core"
    }

    fn fill(
        &self,
        lp: &mut LinearProblem,
        sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()> {
        for cnec in ctx.cnecs.iter().filter(|c| needs_flow_variable(c)) {
            lp.add_variable(
                VarRef::Flow(cnec.id.clone()),
                f64::NEG_INFINITY,
                f64::INFINITY,
            )?;
        }
        for ra in ctx.range_actions {
            let (min, max) = ra.bounds();
            lp.add_variable(VarRef::Setpoint(ra.id.clone()), min, max)?;
            lp.add_variable(VarRef::AbsoluteVariation(ra.id.clone()), 0.0, f64::INFINITY)?;
        }

        for cnec in ctx.cnecs.iter().filter(|c| needs_flow_variable(c)) {
            let mut terms = vec![(VarRef::Flow(cnec.id.clone()), 1.0)];
            for ra in ctx.range_actions {
                terms.push((
                    VarRef::Setpoint(ra.id.clone()),
                    -sensi.sensitivity(&ra.id, &cnec.id),
                ));
            }
            let rhs = flow_definition_rhs(cnec, sensi, ctx)?;
            lp.add_constraint(
                ConRef::FlowDefinition(cnec.id.clone()),
                &terms,
                Some(rhs),
                Some(rhs),
            )?;
        }

        // |setpoint − initial| cannot be expressed directly; one inequality
        // per sign bounds the variation variable from below.
        for ra in ctx.range_actions {
            let initial = ctx.initial_setpoint(ra);
            lp.add_constraint(
                ConRef::VariationPositive(ra.id.clone()),
                &[
                    (VarRef::AbsoluteVariation(ra.id.clone()), 1.0),
                    (VarRef::Setpoint(ra.id.clone()), -1.0),
                ],
                Some(-initial),
                None,
            )?;
            lp.add_constraint(
                ConRef::VariationNegative(ra.id.clone()),
                &[
                    (VarRef::AbsoluteVariation(ra.id.clone()), 1.0),
                    (VarRef::Setpoint(ra.id.clone()), 1.0),
                ],
                Some(initial),
                None,
            )?;
        }
        Ok(())
    }

    fn update(
        &self,
        lp: &mut LinearProblem,
        sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()> {
        for cnec in ctx.cnecs.iter().filter(|c| needs_flow_variable(c)) {
            let con = ConRef::FlowDefinition(cnec.id.clone());
            for ra in ctx.range_actions {
                lp.set_coefficient(
                    &con,
                    &VarRef::Setpoint(ra.id.clone()),
                    -sensi.sensitivity(&ra.id, &cnec.id),
                )?;
            }
            let rhs = flow_definition_rhs(cnec, sensi, ctx)?;
            lp.set_constraint_bounds(&con, Some(rhs), Some(rhs))?;
        }
        Ok(())
    }
}

/// Minimum-margin variable, margin constraints per direction, and the
/// objective. Requires the core filler's flow variables.
pub struct MaxMinMarginFiller;

impl ProblemFiller for MaxMinMarginFiller {
    fn name(&self) -> &'static str {
        "max-min-margin"
    }

    fn fill(
        &self,
        lp: &mut LinearProblem,
        _sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()> {
        lp.add_variable(VarRef::MinimumMargin, f64::NEG_INFINITY, f64::INFINITY)?;

        for cnec in ctx.cnecs.iter().filter(|c| c.optimized) {
            // the margin variable lives in the objective unit; its
            // coefficient converts one unit of margin back to MW so the
            // constraint stays in the sensitivity domain
            let mw_per_unit = megawatt_per_unit(ctx.params.objective_unit, cnec.nominal_voltage_kv);
            if let Some(max) = cnec.threshold.max_mw {
                lp.add_constraint(
                    ConRef::MarginUpper(cnec.id.clone()),
                    &[
                        (VarRef::MinimumMargin, mw_per_unit),
                        (VarRef::Flow(cnec.id.clone()), 1.0),
                    ],
                    None,
                    Some(max),
                )?;
            }
            if let Some(min) = cnec.threshold.min_mw {
                lp.add_constraint(
                    ConRef::MarginLower(cnec.id.clone()),
                    &[
                        (VarRef::MinimumMargin, mw_per_unit),
                        (VarRef::Flow(cnec.id.clone()), -1.0),
                    ],
                    None,
                    Some(-min),
                )?;
            }
        }

        lp.set_objective(&VarRef::MinimumMargin, 1.0)?;
        for ra in ctx.range_actions {
            lp.set_objective(
                &VarRef::AbsoluteVariation(ra.id.clone()),
                -ctx.params.penalty_cost_per_range_action,
            )?;
        }
        Ok(())
    }

    fn update(
        &self,
        lp: &mut LinearProblem,
        _sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()> {
        // thresholds are static; re-assert bounds so an update after a
        // threshold-editing bug fails here rather than drifting
        for cnec in ctx.cnecs.iter().filter(|c| c.optimized) {
            if let Some(max) = cnec.threshold.max_mw {
                lp.set_constraint_bounds(&ConRef::MarginUpper(cnec.id.clone()), None, Some(max))?;
            }
            if let Some(min) = cnec.threshold.min_mw {
                lp.set_constraint_bounds(&ConRef::MarginLower(cnec.id.clone()), None, Some(-min))?;
            }
        }
        Ok(())
    }
}

/// Loop-flow limitation with a penalized violation slack.
pub struct LoopFlowFiller;

impl ProblemFiller for LoopFlowFiller {
    fn name(&self) -> &'static str {
        "loop-flow"
    }

    fn fill(
        &self,
        lp: &mut LinearProblem,
        _sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()> {
        for cnec in ctx.cnecs {
            let Some(threshold) = cnec.loop_flow_threshold_mw else {
                continue;
            };
            let violation = VarRef::LoopFlowViolation(cnec.id.clone());
            lp.add_variable(violation.clone(), 0.0, f64::INFINITY)?;
            let cf = cnec.commercial_flow_mw;
            // |flow − commercial| ≤ threshold + violation
            lp.add_constraint(
                ConRef::LoopFlowUpper(cnec.id.clone()),
                &[
                    (VarRef::Flow(cnec.id.clone()), 1.0),
                    (violation.clone(), -1.0),
                ],
                None,
                Some(cf + threshold),
            )?;
            lp.add_constraint(
                ConRef::LoopFlowLower(cnec.id.clone()),
                &[(VarRef::Flow(cnec.id.clone()), 1.0), (violation.clone(), 1.0)],
                Some(cf - threshold),
                None,
            )?;
            lp.set_objective(&violation, -ctx.params.loop_flow_violation_cost)?;
        }
        Ok(())
    }

    fn update(
        &self,
        lp: &mut LinearProblem,
        _sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()> {
        for cnec in ctx.cnecs {
            let Some(threshold) = cnec.loop_flow_threshold_mw else {
                continue;
            };
            let cf = cnec.commercial_flow_mw;
            lp.set_constraint_bounds(
                &ConRef::LoopFlowUpper(cnec.id.clone()),
                None,
                Some(cf + threshold),
            )?;
            lp.set_constraint_bounds(
                &ConRef::LoopFlowLower(cnec.id.clone()),
                Some(cf - threshold),
                None,
            )?;
        }
        Ok(())
    }
}

/// MNEC limitation: monitored-but-not-optimized elements may not drift more
/// than the acceptable margin decrease from their pre-perimeter flow.
pub struct MnecFiller;

impl ProblemFiller for MnecFiller {
    fn name(&self) -> &'static str {
        "mnec"
    }

    fn fill(
        &self,
        lp: &mut LinearProblem,
        _sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()> {
        let decrease = ctx.params.mnec_acceptable_margin_decrease_mw;
        for cnec in ctx.cnecs.iter().filter(|c| c.is_mnec()) {
            let Some(reference) = cnec.initial_flow_mw else {
                continue;
            };
            let violation = VarRef::MnecViolation(cnec.id.clone());
            lp.add_variable(violation.clone(), 0.0, f64::INFINITY)?;
            lp.add_constraint(
                ConRef::MnecUpper(cnec.id.clone()),
                &[
                    (VarRef::Flow(cnec.id.clone()), 1.0),
                    (violation.clone(), -1.0),
                ],
                None,
                Some(reference + decrease),
            )?;
            lp.add_constraint(
                ConRef::MnecLower(cnec.id.clone()),
                &[(VarRef::Flow(cnec.id.clone()), 1.0), (violation.clone(), 1.0)],
                Some(reference - decrease),
                None,
            )?;
            lp.set_objective(&violation, -ctx.params.mnec_violation_cost)?;
        }
        Ok(())
    }

    fn update(
        &self,
        lp: &mut LinearProblem,
        _sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()> {
        let decrease = ctx.params.mnec_acceptable_margin_decrease_mw;
        for cnec in ctx.cnecs.iter().filter(|c| c.is_mnec()) {
            let Some(reference) = cnec.initial_flow_mw else {
                continue;
            };
            lp.set_constraint_bounds(
                &ConRef::MnecUpper(cnec.id.clone()),
                None,
                Some(reference + decrease),
            )?;
            lp.set_constraint_bounds(
                &ConRef::MnecLower(cnec.id.clone()),
                Some(reference - decrease),
                None,
            )?;
        }
        Ok(())
    }
}

/// Usage-limit counting over relaxed [0, 1] activation variables.
///
/// The discrete enforcement lives in the search tree; this filler only keeps
/// the continuous solution inside the remaining per-operator and global
/// range-action budgets, via `variation ≤ span × activation` linking.
pub struct UsageLimitFiller;

impl UsageLimitFiller {
    fn tso_groups<'a>(ctx: &'a FillerContext) -> BTreeMap<&'a str, Vec<&'a RangeAction>> {
        let mut groups: BTreeMap<&str, Vec<&RangeAction>> = BTreeMap::new();
        for ra in ctx.range_actions {
            groups.entry(ra.operator.as_str()).or_default().push(ra);
        }
        groups
    }
}

impl ProblemFiller for UsageLimitFiller {
    fn name(&self) -> &'static str {
        "usage-limits"
    }

    fn fill(
        &self,
        lp: &mut LinearProblem,
        _sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()> {
        for ra in ctx.range_actions {
            let (min, max) = ra.bounds();
            let span = max - min;
            lp.add_variable(VarRef::Activation(ra.id.clone()), 0.0, 1.0)?;
            lp.add_constraint(
                ConRef::ActivationLink(ra.id.clone()),
                &[
                    (VarRef::AbsoluteVariation(ra.id.clone()), 1.0),
                    (VarRef::Activation(ra.id.clone()), -span),
                ],
                None,
                Some(0.0),
            )?;
        }

        for (tso, ras) in Self::tso_groups(ctx) {
            let Some(remaining) =
                ctx.limits
                    .remaining_range_actions(tso, ctx.activated_network_actions)
            else {
                continue;
            };
            let terms: Vec<(VarRef, f64)> = ras
                .iter()
                .map(|ra| (VarRef::Activation(ra.id.clone()), 1.0))
                .collect();
            lp.add_constraint(
                ConRef::TsoRangeActionCap(tso.to_string()),
                &terms,
                None,
                Some(remaining as f64),
            )?;
        }

        if let Some(remaining) = ctx
            .limits
            .remaining_global_range_actions(ctx.activated_network_actions)
        {
            let terms: Vec<(VarRef, f64)> = ctx
                .range_actions
                .iter()
                .map(|ra| (VarRef::Activation(ra.id.clone()), 1.0))
                .collect();
            if !terms.is_empty() {
                lp.add_constraint(
                    ConRef::GlobalRangeActionCap,
                    &terms,
                    None,
                    Some(remaining as f64),
                )?;
            }
        }
        Ok(())
    }

    fn update(
        &self,
        lp: &mut LinearProblem,
        _sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<()> {
        for (tso, _) in Self::tso_groups(ctx) {
            if let Some(remaining) =
                ctx.limits
                    .remaining_range_actions(tso, ctx.activated_network_actions)
            {
                lp.set_constraint_bounds(
                    &ConRef::TsoRangeActionCap(tso.to_string()),
                    None,
                    Some(remaining as f64),
                )?;
            }
        }
        if let Some(remaining) = ctx
            .limits
            .remaining_global_range_actions(ctx.activated_network_actions)
        {
            if !ctx.range_actions.is_empty() {
                lp.set_constraint_bounds(
                    &ConRef::GlobalRangeActionCap,
                    None,
                    Some(remaining as f64),
                )?;
            }
        }
        Ok(())
    }
}

/// Filler list for a given problem, in the mandatory order.
pub fn default_fillers(
    cnecs: &[Cnec],
    limits: &UsageLimits,
) -> Vec<Box<dyn ProblemFiller>> {
    let mut fillers: Vec<Box<dyn ProblemFiller>> =
        vec![Box::new(CoreProblemFiller), Box::new(MaxMinMarginFiller)];
    if cnecs.iter().any(|c| c.loop_flow_threshold_mw.is_some()) {
        fillers.push(Box::new(LoopFlowFiller));
    }
    if cnecs.iter().any(|c| c.is_mnec()) {
        fillers.push(Box::new(MnecFiller));
    }
    if limits.caps_range_actions() {
        fillers.push(Box::new(UsageLimitFiller));
    }
    fillers
}
