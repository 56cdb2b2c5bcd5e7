//! Engine outputs.

use crate::objective::ObjectiveFunctionResult;
use rao_core::Instant;
use serde::Serialize;
use std::collections::BTreeMap;

/// Solved activation of one range action.
#[derive(Debug, Clone, Serialize)]
pub struct RangeActionActivation {
    pub action_id: String,
    pub operator: String,
    /// Feasible setpoint actually applied (post tap-rounding for PSTs)
    pub setpoint: f64,
    /// Tap position, for PSTs
    pub tap: Option<i32>,
}

/// Range-action schedule keyed by action id.
pub type ActivationMap = BTreeMap<String, RangeActionActivation>;

/// Whether two schedules activate the same taps/setpoints.
///
/// Taps compare exactly; continuous setpoints within solver tolerance.
pub fn same_activations(a: &ActivationMap, b: &ActivationMap) -> bool {
    a.len() == b.len()
        && a.iter().all(|(id, act)| {
            b.get(id)
                .is_some_and(|other| {
                    act.tap == other.tap && (act.setpoint - other.setpoint).abs() < 1e-6
                })
        })
}

/// How one search-tree leaf ended up.
#[derive(Debug, Clone, Serialize)]
pub enum LeafDisposition {
    /// Fully evaluated; may or may not have become the incumbent
    Evaluated { total_cost: f64, fallback: bool },
    /// Skipped before or after evaluation (impact threshold, usage limits)
    Pruned { reason: String },
    /// Evaluation failed; siblings are unaffected
    Discarded { error: String },
}

/// Per-leaf trace entry of one search run.
#[derive(Debug, Clone, Serialize)]
pub struct LeafRecord {
    pub depth: usize,
    /// Canonical (sorted) activated network-action ids
    pub actions: Vec<String>,
    pub disposition: LeafDisposition,
}

/// Final outcome of one remedial-action optimization run.
#[derive(Debug, Clone, Serialize)]
pub struct RaoRunResult {
    /// Instant of the optimized perimeter
    pub instant: Instant,
    /// Contingency of the optimized perimeter, `None` for the basecase
    pub contingency: Option<String>,
    /// Network actions of the best explored leaf
    pub network_actions: Vec<String>,
    /// Range-action schedule of the best explored leaf
    pub range_actions: ActivationMap,
    pub objective: ObjectiveFunctionResult,
    /// Whether the winning branch ran on fallback sensitivity parameters
    pub sensitivity_fallback: bool,
    /// Trace of every leaf touched by the search
    pub leaves: Vec<LeafRecord>,
    pub depth_reached: usize,
    pub run_time_ms: u128,
}

impl RaoRunResult {
    pub fn summary(&self) -> String {
        let discarded = self
            .leaves
            .iter()
            .filter(|l| matches!(l.disposition, LeafDisposition::Discarded { .. }))
            .count();
        format!(
            "best cost {:.2} {} with {} network action(s) at depth {}/{} leaves ({} discarded){}",
            self.objective.total_cost(),
            self.objective.unit,
            self.network_actions.len(),
            self.depth_reached,
            self.leaves.len(),
            discarded,
            if self.sensitivity_fallback {
                ", sensitivity degraded"
            } else {
                ""
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activation(id: &str, setpoint: f64, tap: Option<i32>) -> RangeActionActivation {
        RangeActionActivation {
            action_id: id.into(),
            operator: "TSO1".into(),
            setpoint,
            tap,
        }
    }

    #[test]
    fn test_same_activations_tolerance() {
        let mut a = ActivationMap::new();
        a.insert("ra".into(), activation("ra", 1.0, Some(2)));
        let mut b = ActivationMap::new();
        b.insert("ra".into(), activation("ra", 1.0 + 1e-9, Some(2)));
        assert!(same_activations(&a, &b));

        b.insert("ra".into(), activation("ra", 1.0, Some(3)));
        assert!(!same_activations(&a, &b));
    }

    #[test]
    fn test_same_activations_length_mismatch() {
        let mut a = ActivationMap::new();
        a.insert("ra".into(), activation("ra", 0.0, None));
        let b = ActivationMap::new();
        assert!(!same_activations(&a, &b));
    }
}
