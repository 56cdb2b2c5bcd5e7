//! Linear optimization engine.
//!
//! Orchestrates the filler list against one [`LinearProblem`] instance: the
//! first run builds the model from scratch, later runs on the same instance
//! rewrite coefficients in place so variable identities survive across the
//! convergence loop. Any non-optimal solve status is fatal for the branch.

use crate::linear::fillers::{FillerContext, ProblemFiller};
use crate::linear::problem::{LinearProblem, ObjectiveSense, VarRef};
use crate::result::{ActivationMap, RangeActionActivation};
use crate::sensitivity::SensitivityResult;
use rao_core::{RaoError, RaoResult};
use tracing::debug;

pub struct LinearOptimizationEngine {
    fillers: Vec<Box<dyn ProblemFiller>>,
    problem: Option<LinearProblem>,
}

impl LinearOptimizationEngine {
    pub fn new(fillers: Vec<Box<dyn ProblemFiller>>) -> Self {
        Self {
            fillers,
            problem: None,
        }
    }

    /// Whether the problem has been built (first run done).
    pub fn is_initialized(&self) -> bool {
        self.problem.is_some()
    }

    /// Build or update the problem, solve it, and extract the rounded
    /// range-action schedule.
    pub fn run(
        &mut self,
        sensi: &SensitivityResult,
        ctx: &FillerContext,
    ) -> RaoResult<ActivationMap> {
        let problem = match self.problem.as_mut() {
            Some(problem) => {
                for filler in &self.fillers {
                    filler.update(problem, sensi, ctx)?;
                }
                problem
            }
            None => {
                let mut problem = LinearProblem::new(ObjectiveSense::Maximize);
                for filler in &self.fillers {
                    filler.fill(&mut problem, sensi, ctx)?;
                }
                debug!(
                    variables = problem.num_variables(),
                    constraints = problem.num_constraints(),
                    "linear problem built"
                );
                self.problem.insert(problem)
            }
        };

        let solution = problem.solve();
        if !solution.is_optimal() {
            return Err(RaoError::Solver {
                status: solution.status.to_string(),
                message: solution.message,
            });
        }

        let mut activations = ActivationMap::new();
        for ra in ctx.range_actions {
            let relaxed = problem.value_of(&solution, &VarRef::Setpoint(ra.id.clone()))?;
            // the LP-relaxed angle is advisory; the rounded one is what the
            // network can actually realize and what gets applied
            activations.insert(
                ra.id.clone(),
                RangeActionActivation {
                    action_id: ra.id.clone(),
                    operator: ra.operator.clone(),
                    setpoint: ra.round_setpoint(relaxed),
                    tap: ra.tap_for(relaxed),
                },
            );
        }
        Ok(activations)
    }
}
