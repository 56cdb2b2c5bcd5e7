//! Per-operator and global caps on remedial-action usage.
//!
//! Caps are cross-checked once at configuration time; the search tree
//! enforces them while expanding, and the objective function only re-checks
//! them defensively.

use crate::action::NetworkAction;
use crate::error::{RaoError, RaoResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Caps on the number of activated remedial actions.
///
/// `None`/absent entries mean uncapped. Topological and PST caps are
/// sub-budgets of the total remedial-action cap for the same operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageLimits {
    /// Global cap on activated remedial actions of any kind
    pub max_remedial_actions: Option<usize>,
    /// Global cap on activated topological actions
    pub max_topological_actions: Option<usize>,
    /// Global cap on range actions moved away from their initial setpoint
    pub max_range_actions: Option<usize>,
    /// Per-operator cap on activated remedial actions of any kind
    pub max_ra_per_tso: HashMap<String, usize>,
    /// Per-operator cap on activated topological actions
    pub max_topo_per_tso: HashMap<String, usize>,
    /// Per-operator cap on range actions moved away from their initial
    /// setpoint
    pub max_pst_per_tso: HashMap<String, usize>,
}

impl UsageLimits {
    /// Cross-check the caps. A per-operator topo or PST cap larger than the
    /// same operator's total cap can never bind and is a configuration
    /// mistake.
    pub fn validate(&self) -> RaoResult<()> {
        for (tso, sub_cap) in self.max_topo_per_tso.iter().chain(&self.max_pst_per_tso) {
            if let Some(total) = self.max_ra_per_tso.get(tso) {
                if sub_cap > total {
                    return Err(RaoError::Config(format!(
                        "Usage limit for operator {tso}: sub-cap {sub_cap} exceeds total \
                         remedial-action cap {total}"
                    )));
                }
            }
        }
        if let (Some(topo), Some(total)) =
            (self.max_topological_actions, self.max_remedial_actions)
        {
            if topo > total {
                return Err(RaoError::Config(format!(
                    "Global topological cap {topo} exceeds global remedial-action cap {total}"
                )));
            }
        }
        Ok(())
    }

    /// Whether a set of network actions respects the caps.
    pub fn admits(&self, actions: &[&NetworkAction]) -> bool {
        if let Some(cap) = self.max_remedial_actions {
            if actions.len() > cap {
                return false;
            }
        }
        if let Some(cap) = self.max_topological_actions {
            if actions.iter().filter(|a| a.is_topological()).count() > cap {
                return false;
            }
        }

        let mut per_tso: HashMap<&str, (usize, usize)> = HashMap::new();
        for action in actions {
            let entry = per_tso.entry(action.operator.as_str()).or_default();
            entry.0 += 1;
            if action.is_topological() {
                entry.1 += 1;
            }
        }
        for (tso, (total, topo)) in per_tso {
            if let Some(cap) = self.max_ra_per_tso.get(tso) {
                if total > *cap {
                    return false;
                }
            }
            if let Some(cap) = self.max_topo_per_tso.get(tso) {
                if topo > *cap {
                    return false;
                }
            }
        }
        true
    }

    /// Range-action budget left for `tso` after the given network actions
    /// have consumed part of its total cap. `None` means uncapped.
    pub fn remaining_range_actions(
        &self,
        tso: &str,
        activated_network_actions: &[&NetworkAction],
    ) -> Option<usize> {
        let used = activated_network_actions
            .iter()
            .filter(|a| a.operator == tso)
            .count();
        let total_cap = self.max_ra_per_tso.get(tso).copied();
        let pst_cap = self.max_pst_per_tso.get(tso).copied();
        match (total_cap, pst_cap) {
            (Some(t), Some(p)) => Some(p.min(t.saturating_sub(used))),
            (Some(t), None) => Some(t.saturating_sub(used)),
            (None, Some(p)) => Some(p),
            (None, None) => None,
        }
    }

    /// Global range-action budget left after network-action activations.
    pub fn remaining_global_range_actions(
        &self,
        activated_network_actions: &[&NetworkAction],
    ) -> Option<usize> {
        let used = activated_network_actions.len();
        match (self.max_remedial_actions, self.max_range_actions) {
            (Some(t), Some(r)) => Some(r.min(t.saturating_sub(used))),
            (Some(t), None) => Some(t.saturating_sub(used)),
            (None, Some(r)) => Some(r),
            (None, None) => None,
        }
    }

    /// Whether any cap can constrain range-action activation counting.
    pub fn caps_range_actions(&self) -> bool {
        self.max_remedial_actions.is_some()
            || self.max_range_actions.is_some()
            || !self.max_ra_per_tso.is_empty()
            || !self.max_pst_per_tso.is_empty()
    }
}
