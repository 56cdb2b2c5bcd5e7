//! Mutable linear-program model.
//!
//! Fillers register variables under typed references and contribute range
//! constraints and objective terms. The model is plain data until
//! [`LinearProblem::solve`], which lowers it to a `good_lp` model and runs
//! the Clarabel backend; this keeps the model incrementally updatable
//! (coefficients and bounds can be rewritten in place between solves while
//! variable identities stay stable).
//!
//! Looking up a variable that an earlier filler should have created is a
//! configuration error with a named message, never a silent re-creation.

use good_lp::solvers::clarabel::clarabel;
use good_lp::{constraint, variable, variables, Expression, Solution, SolverModel};
use rao_core::{RaoError, RaoResult};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Typed reference to an LP variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarRef {
    /// Flow on a monitored element (MW)
    Flow(String),
    /// Range-action setpoint, in its optimization domain
    Setpoint(String),
    /// Absolute setpoint variation from the initial setpoint (cost proxy)
    AbsoluteVariation(String),
    /// Relaxed [0, 1] activation indicator of a range action
    Activation(String),
    /// The scalar minimum margin being maximized
    MinimumMargin,
    /// Non-negative loop-flow violation slack of a CNEC
    LoopFlowViolation(String),
    /// Non-negative margin-decrease violation slack of an MNEC
    MnecViolation(String),
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarRef::Flow(id) => write!(f, "Flow variable for cnec {id}"),
            VarRef::Setpoint(id) => write!(f, "Setpoint variable for range action {id}"),
            VarRef::AbsoluteVariation(id) => {
                write!(f, "Absolute-variation variable for range action {id}")
            }
            VarRef::Activation(id) => write!(f, "Activation variable for range action {id}"),
            VarRef::MinimumMargin => write!(f, "Minimum-margin variable"),
            VarRef::LoopFlowViolation(id) => {
                write!(f, "Loop-flow violation variable for cnec {id}")
            }
            VarRef::MnecViolation(id) => write!(f, "Mnec violation variable for cnec {id}"),
        }
    }
}

/// Typed reference to an LP constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConRef {
    /// flow = refFlow + Σ sensi × (setpoint − refSetpoint)
    FlowDefinition(String),
    /// variation ≥ setpoint − initial
    VariationPositive(String),
    /// variation ≥ initial − setpoint
    VariationNegative(String),
    /// margin ≤ threshold − flow (upper direction)
    MarginUpper(String),
    /// margin ≤ flow − threshold (lower direction)
    MarginLower(String),
    /// variation ≤ span × activation
    ActivationLink(String),
    /// Σ activation over one operator's range actions
    TsoRangeActionCap(String),
    /// Σ activation over all range actions
    GlobalRangeActionCap,
    LoopFlowUpper(String),
    LoopFlowLower(String),
    MnecUpper(String),
    MnecLower(String),
}

/// Objective direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    Maximize,
    Minimize,
}

/// Terminal status of one solve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Error,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "Optimal"),
            SolveStatus::Infeasible => write!(f, "Infeasible"),
            SolveStatus::Unbounded => write!(f, "Unbounded"),
            SolveStatus::Error => write!(f, "Error"),
        }
    }
}

/// Outcome of one solve: status, per-variable values (empty unless optimal)
/// and the objective value.
#[derive(Debug, Clone)]
pub struct LpSolution {
    pub status: SolveStatus,
    pub message: String,
    values: Vec<f64>,
    pub objective_value: f64,
}

impl LpSolution {
    pub fn is_optimal(&self) -> bool {
        self.status == SolveStatus::Optimal
    }
}

#[derive(Debug, Clone)]
struct VariableDef {
    min: f64,
    max: f64,
}

#[derive(Debug, Clone)]
struct ConstraintDef {
    terms: BTreeMap<usize, f64>,
    lower: Option<f64>,
    upper: Option<f64>,
}

/// The mutable LP model. Owned by exactly one linear-optimization engine
/// invocation at a time.
#[derive(Debug, Clone)]
pub struct LinearProblem {
    sense: ObjectiveSense,
    variables: Vec<VariableDef>,
    var_index: HashMap<VarRef, usize>,
    constraints: Vec<ConstraintDef>,
    con_index: HashMap<ConRef, usize>,
    objective: BTreeMap<usize, f64>,
}

impl LinearProblem {
    pub fn new(sense: ObjectiveSense) -> Self {
        Self {
            sense,
            variables: Vec::new(),
            var_index: HashMap::new(),
            constraints: Vec::new(),
            con_index: HashMap::new(),
            objective: BTreeMap::new(),
        }
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Register a new variable. Registering the same reference twice is a
    /// filler-ordering bug and fails fast.
    pub fn add_variable(&mut self, r: VarRef, min: f64, max: f64) -> RaoResult<()> {
        if self.var_index.contains_key(&r) {
            return Err(RaoError::Config(format!("{r} already defined")));
        }
        self.variables.push(VariableDef { min, max });
        self.var_index.insert(r, self.variables.len() - 1);
        Ok(())
    }

    fn variable_index(&self, r: &VarRef) -> RaoResult<usize> {
        self.var_index
            .get(r)
            .copied()
            .ok_or_else(|| RaoError::Config(format!("{r} not found")))
    }

    pub fn has_variable(&self, r: &VarRef) -> bool {
        self.var_index.contains_key(r)
    }

    pub fn set_variable_bounds(&mut self, r: &VarRef, min: f64, max: f64) -> RaoResult<()> {
        let idx = self.variable_index(r)?;
        self.variables[idx] = VariableDef { min, max };
        Ok(())
    }

    /// Add a range constraint `lower ≤ Σ coeff×var ≤ upper` over typed
    /// variable references.
    pub fn add_constraint(
        &mut self,
        r: ConRef,
        terms: &[(VarRef, f64)],
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> RaoResult<()> {
        if self.con_index.contains_key(&r) {
            return Err(RaoError::Config(format!("constraint {r:?} already defined")));
        }
        let mut resolved = BTreeMap::new();
        for (var_ref, coeff) in terms {
            resolved.insert(self.variable_index(var_ref)?, *coeff);
        }
        self.constraints.push(ConstraintDef {
            terms: resolved,
            lower,
            upper,
        });
        self.con_index.insert(r, self.constraints.len() - 1);
        Ok(())
    }

    fn constraint_index(&self, r: &ConRef) -> RaoResult<usize> {
        self.con_index
            .get(r)
            .copied()
            .ok_or_else(|| RaoError::Config(format!("constraint {r:?} not found")))
    }

    /// Rewrite one coefficient of an existing constraint (incremental
    /// update path; variable identities are reused).
    pub fn set_coefficient(&mut self, con: &ConRef, var: &VarRef, coeff: f64) -> RaoResult<()> {
        let con_idx = self.constraint_index(con)?;
        let var_idx = self.variable_index(var)?;
        self.constraints[con_idx].terms.insert(var_idx, coeff);
        Ok(())
    }

    pub fn set_constraint_bounds(
        &mut self,
        con: &ConRef,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> RaoResult<()> {
        let idx = self.constraint_index(con)?;
        self.constraints[idx].lower = lower;
        self.constraints[idx].upper = upper;
        Ok(())
    }

    /// Set the objective coefficient of a variable.
    pub fn set_objective(&mut self, var: &VarRef, coeff: f64) -> RaoResult<()> {
        let idx = self.variable_index(var)?;
        self.objective.insert(idx, coeff);
        Ok(())
    }

    /// Value of a typed variable in a solution of this problem.
    pub fn value_of(&self, solution: &LpSolution, r: &VarRef) -> RaoResult<f64> {
        let idx = self.variable_index(r)?;
        solution
            .values
            .get(idx)
            .copied()
            .ok_or_else(|| RaoError::Other(format!("no solution value for {r}")))
    }

    /// Lower the model to `good_lp` and solve with the Clarabel backend.
    pub fn solve(&self) -> LpSolution {
        let mut vars = variables!();
        let mut handles = Vec::with_capacity(self.variables.len());
        for def in &self.variables {
            let mut v = variable();
            if def.min.is_finite() {
                v = v.min(def.min);
            }
            if def.max.is_finite() {
                v = v.max(def.max);
            }
            handles.push(vars.add(v));
        }

        let mut objective = Expression::from(0.0);
        for (&idx, &coeff) in &self.objective {
            objective += coeff * handles[idx];
        }

        let mut model = match self.sense {
            ObjectiveSense::Maximize => vars.maximise(objective).using(clarabel),
            ObjectiveSense::Minimize => vars.minimise(objective).using(clarabel),
        };

        for con in &self.constraints {
            let mut lhs = Expression::from(0.0);
            for (&idx, &coeff) in &con.terms {
                lhs += coeff * handles[idx];
            }
            match (con.lower, con.upper) {
                (Some(lo), Some(up)) if lo == up => {
                    model = model.with(constraint!(lhs == lo));
                }
                (lower, upper) => {
                    if let Some(up) = upper {
                        model = model.with(constraint!(lhs.clone() <= up));
                    }
                    if let Some(lo) = lower {
                        model = model.with(constraint!(lhs >= lo));
                    }
                }
            }
        }

        match model.solve() {
            Ok(solution) => {
                let values: Vec<f64> = handles.iter().map(|v| solution.value(*v)).collect();
                let objective_value = self
                    .objective
                    .iter()
                    .map(|(&idx, &coeff)| coeff * values[idx])
                    .sum();
                LpSolution {
                    status: SolveStatus::Optimal,
                    message: String::new(),
                    values,
                    objective_value,
                }
            }
            Err(err) => {
                let status = match err {
                    good_lp::ResolutionError::Infeasible => SolveStatus::Infeasible,
                    good_lp::ResolutionError::Unbounded => SolveStatus::Unbounded,
                    _ => SolveStatus::Error,
                };
                LpSolution {
                    status,
                    message: format!("{err:?}"),
                    values: Vec::new(),
                    objective_value: f64::NAN,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_maximization() {
        // maximize x + y, x ≤ 4, y ≤ 3, x + y ≤ 5
        let mut lp = LinearProblem::new(ObjectiveSense::Maximize);
        lp.add_variable(VarRef::Setpoint("x".into()), 0.0, 4.0).unwrap();
        lp.add_variable(VarRef::Setpoint("y".into()), 0.0, 3.0).unwrap();
        lp.add_constraint(
            ConRef::GlobalRangeActionCap,
            &[
                (VarRef::Setpoint("x".into()), 1.0),
                (VarRef::Setpoint("y".into()), 1.0),
            ],
            None,
            Some(5.0),
        )
        .unwrap();
        lp.set_objective(&VarRef::Setpoint("x".into()), 1.0).unwrap();
        lp.set_objective(&VarRef::Setpoint("y".into()), 1.0).unwrap();

        let solution = lp.solve();
        assert!(solution.is_optimal());
        assert!((solution.objective_value - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_simple_minimization() {
        // minimize x subject to x ≥ 2
        let mut lp = LinearProblem::new(ObjectiveSense::Minimize);
        lp.add_variable(VarRef::Setpoint("x".into()), 0.0, 10.0).unwrap();
        lp.add_constraint(
            ConRef::MarginLower("c".into()),
            &[(VarRef::Setpoint("x".into()), 1.0)],
            Some(2.0),
            None,
        )
        .unwrap();
        lp.set_objective(&VarRef::Setpoint("x".into()), 1.0).unwrap();

        let solution = lp.solve();
        assert!(solution.is_optimal());
        assert!((solution.objective_value - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_infeasible_status() {
        // x ≥ 1 and x ≤ -1 cannot both hold
        let mut lp = LinearProblem::new(ObjectiveSense::Maximize);
        lp.add_variable(VarRef::Setpoint("x".into()), f64::NEG_INFINITY, f64::INFINITY)
            .unwrap();
        lp.add_constraint(
            ConRef::MarginUpper("c".into()),
            &[(VarRef::Setpoint("x".into()), 1.0)],
            Some(1.0),
            None,
        )
        .unwrap();
        lp.add_constraint(
            ConRef::MarginLower("c".into()),
            &[(VarRef::Setpoint("x".into()), 1.0)],
            None,
            Some(-1.0),
        )
        .unwrap();
        lp.set_objective(&VarRef::Setpoint("x".into()), 1.0).unwrap();

        let solution = lp.solve();
        assert_eq!(solution.status, SolveStatus::Infeasible);
        assert!(!solution.is_optimal());
    }

    #[test]
    fn test_missing_variable_is_named_error() {
        let mut lp = LinearProblem::new(ObjectiveSense::Maximize);
        let err = lp
            .add_constraint(
                ConRef::MarginUpper("cnec-7".into()),
                &[(VarRef::Flow("cnec-7".into()), 1.0)],
                None,
                Some(0.0),
            )
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("Flow variable for cnec cnec-7 not found"));
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        let mut lp = LinearProblem::new(ObjectiveSense::Maximize);
        lp.add_variable(VarRef::MinimumMargin, 0.0, 1.0).unwrap();
        let err = lp.add_variable(VarRef::MinimumMargin, 0.0, 1.0).unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn test_coefficient_update_changes_solution() {
        // maximize m subject to m + c·x ≤ 10 with x fixed at 1
        let mut lp = LinearProblem::new(ObjectiveSense::Maximize);
        lp.add_variable(VarRef::Setpoint("x".into()), 1.0, 1.0).unwrap();
        lp.add_variable(VarRef::MinimumMargin, f64::NEG_INFINITY, f64::INFINITY)
            .unwrap();
        lp.add_constraint(
            ConRef::MarginUpper("c".into()),
            &[
                (VarRef::MinimumMargin, 1.0),
                (VarRef::Setpoint("x".into()), 2.0),
            ],
            None,
            Some(10.0),
        )
        .unwrap();
        lp.set_objective(&VarRef::MinimumMargin, 1.0).unwrap();

        let first = lp.solve();
        assert!((lp.value_of(&first, &VarRef::MinimumMargin).unwrap() - 8.0).abs() < 1e-6);

        lp.set_coefficient(
            &ConRef::MarginUpper("c".into()),
            &VarRef::Setpoint("x".into()),
            5.0,
        )
        .unwrap();
        let second = lp.solve();
        assert!((lp.value_of(&second, &VarRef::MinimumMargin).unwrap() - 5.0).abs() < 1e-6);
    }
}
