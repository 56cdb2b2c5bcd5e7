//! Linear-programming layer: the mutable problem model, the concern-scoped
//! fillers that populate it, and the engine that drives build/update/solve.

pub mod engine;
pub mod fillers;
pub mod problem;

pub use engine::LinearOptimizationEngine;
pub use fillers::{
    default_fillers, CoreProblemFiller, FillerContext, LoopFlowFiller, MaxMinMarginFiller,
    MnecFiller, ProblemFiller, UsageLimitFiller,
};
pub use problem::{ConRef, LinearProblem, LpSolution, ObjectiveSense, SolveStatus, VarRef};
