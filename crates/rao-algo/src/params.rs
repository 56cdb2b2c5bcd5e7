//! Engine configuration.
//!
//! All knobs the caller tunes in one place, serde-serializable so external
//! tooling can persist them. No file loading happens here.

use rao_core::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Linear-solver backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverChoice {
    /// Pure-Rust interior-point backend, always compiled in
    #[default]
    Clarabel,
}

/// Parameter set handed to the sensitivity provider.
///
/// The provider interprets `provider_options`; the engine only cares that a
/// default and an optional fallback set exist and that timeouts are treated
/// as computation failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityParameters {
    /// Wall-clock budget for one systematic computation (seconds)
    pub timeout_seconds: u64,
    /// Free-form provider knobs (slack distribution, solver tuning, …)
    pub provider_options: BTreeMap<String, String>,
}

impl Default for SensitivityParameters {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            provider_options: BTreeMap::new(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaoParameters {
    /// Unit in which margins and costs are expressed (MW or A)
    pub objective_unit: Unit,
    /// Cap on sensitivity/LP alternations inside one leaf
    pub max_iterations: usize,
    /// Cap on search-tree depth (number of combined network actions)
    pub max_search_depth: usize,
    /// Minimum absolute cost improvement a leaf must bring over its parent
    pub absolute_impact_threshold: f64,
    /// Minimum relative cost improvement (fraction of the parent cost)
    pub relative_impact_threshold: f64,
    /// Worker count for parallel leaf evaluation at one depth
    pub leaf_parallelism: usize,
    pub solver: SolverChoice,
    /// Relative MIP gap passed to solvers that support it
    pub relative_mip_gap: f64,
    /// Tie-break penalty per unit of range-action movement
    pub penalty_cost_per_range_action: f64,
    /// Margin decrease an MNEC may suffer before it counts as violated (MW)
    pub mnec_acceptable_margin_decrease_mw: f64,
    /// Cost weight per unit of MNEC violation
    pub mnec_violation_cost: f64,
    /// Cost weight per unit of loop-flow violation
    pub loop_flow_violation_cost: f64,
    /// Flat overcost applied while a branch runs on fallback sensitivity
    /// parameters
    pub sensitivity_failure_overcost: f64,
    /// Cost weight per remedial action in excess of a usage cap
    pub usage_limit_violation_cost: f64,
    pub sensitivity: SensitivityParameters,
    /// Retry parameter set for failed sensitivity computations
    pub fallback_sensitivity: Option<SensitivityParameters>,
}

impl Default for RaoParameters {
    fn default() -> Self {
        Self {
            objective_unit: Unit::Megawatt,
            max_iterations: 10,
            max_search_depth: 5,
            absolute_impact_threshold: 0.0,
            relative_impact_threshold: 0.0,
            leaf_parallelism: 1,
            solver: SolverChoice::Clarabel,
            relative_mip_gap: 1e-4,
            penalty_cost_per_range_action: 0.01,
            mnec_acceptable_margin_decrease_mw: 50.0,
            mnec_violation_cost: 10.0,
            loop_flow_violation_cost: 10.0,
            sensitivity_failure_overcost: 10_000.0,
            usage_limit_violation_cost: 10_000.0,
            sensitivity: SensitivityParameters::default(),
            fallback_sensitivity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let params = RaoParameters::default();
        assert_eq!(params.objective_unit, Unit::Megawatt);
        assert!(params.max_iterations > 0);
        assert!(params.penalty_cost_per_range_action > 0.0);
        assert!(params.fallback_sensitivity.is_none());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut params = RaoParameters::default();
        params.fallback_sensitivity = Some(SensitivityParameters {
            timeout_seconds: 60,
            provider_options: [("slack".to_string(), "distributed".to_string())]
                .into_iter()
                .collect(),
        });
        let json = serde_json::to_string(&params).unwrap();
        let back: RaoParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back.fallback_sensitivity, params.fallback_sensitivity);
        assert_eq!(back.max_search_depth, params.max_search_depth);
    }
}
