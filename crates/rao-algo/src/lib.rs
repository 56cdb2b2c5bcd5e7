//! # rao-algo: Remedial-Action Search and Optimization Engine
//!
//! Computes, for a transmission network under contingency constraints, the
//! combination of discrete and continuous remedial actions that maximizes
//! the worst-case security margin while respecting per-operator usage
//! limits.
//!
//! ## Architecture
//!
//! | Component | Role |
//! |-----------|------|
//! | [`SensitivityEngine`] | Wraps the external sensitivity provider with fallback-parameter retry |
//! | [`linear::LinearProblem`] | Mutable LP model lowered to `good_lp`/Clarabel at solve time |
//! | [`linear::ProblemFiller`] | One concern each: core variables, min-margin, loop-flow, MNEC, usage caps |
//! | [`linear::LinearOptimizationEngine`] | Build-then-update orchestration, solve, PST tap rounding |
//! | [`ObjectiveFunction`] | Functional cost (worst margin) + registered virtual-cost evaluators |
//! | [`RangeActionOptimizer`] | Sensitivity/LP alternation until the activation set stabilizes |
//! | [`SearchTree`] | Greedy depth-wise exploration of network-action combinations |
//!
//! ## Data flow
//!
//! The search tree creates a leaf per candidate action set; each leaf clones
//! the root network state, applies its actions, and runs the range-action
//! convergence loop; the objective function scores the resulting flows; the
//! tree keeps the cheapest leaf per depth and expands from it.
//!
//! ## Example
//!
//! ```ignore
//! use rao_algo::{RaoParameters, SearchTree, SearchTreeConfig};
//!
//! let tree = SearchTree::new(config, sensitivity_provider)?;
//! let result = tree.run(initial_state)?;
//! println!("{}", result.summary());
//! ```

pub mod linear;
pub mod objective;
pub mod optimizer;
pub mod params;
pub mod result;
pub mod search;
pub mod sensitivity;

pub use objective::{
    EvaluationContext, LoopFlowViolationCostEvaluator, MnecViolationCostEvaluator,
    ObjectiveFunction, ObjectiveFunctionResult, SensitivityFallbackCostEvaluator,
    UsageLimitCostEvaluator, VirtualCostEvaluator,
};
pub use optimizer::{OptimizationOutcome, RangeActionOptimizer};
pub use params::{RaoParameters, SensitivityParameters, SolverChoice};
pub use result::{
    same_activations, ActivationMap, LeafDisposition, LeafRecord, RangeActionActivation,
    RaoRunResult,
};
pub use search::{SearchTree, SearchTreeConfig};
pub use sensitivity::{
    ParameterMode, SensitivityEngine, SensitivityError, SensitivityProvider, SensitivityResult,
};
