//! Remedial-action model.
//!
//! Actions come in two closed families, resolved by pattern match rather than
//! virtual dispatch:
//!
//! - [`RangeAction`]: a continuous lever (PST tap expressed as an angle, HVDC
//!   setpoint, injection setpoint) sized by the linear optimizer.
//! - [`NetworkAction`]: a discrete lever (topology switch, discrete setpoint)
//!   chosen by the search tree, gated by usage rules.
//!
//! PSTs are the awkward case: the LP works on the continuous angle, but the
//! hardware only has discrete taps, so solutions are rounded back through the
//! tap/angle conversion law before being applied.

use crate::state::NetworkState;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Optimization instant of a state (pre- or post-contingency).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instant {
    /// Base case, before any contingency
    Preventive,
    /// Just after a contingency, temporary limits apply
    Outage,
    /// After curative actions have had time to act
    Curative,
}

/// Linear tap/angle conversion law of a phase-shifting transformer.
///
/// Tap `t` maps to angle `t · angle_step_deg`; the inverse rounds to the
/// nearest feasible tap within `[min_tap, max_tap]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapToAngle {
    pub min_tap: i32,
    pub max_tap: i32,
    pub angle_step_deg: f64,
}

impl TapToAngle {
    pub fn angle(&self, tap: i32) -> f64 {
        f64::from(tap) * self.angle_step_deg
    }

    /// Nearest feasible tap for a continuous angle.
    pub fn nearest_tap(&self, angle_deg: f64) -> i32 {
        let raw = (angle_deg / self.angle_step_deg).round() as i32;
        raw.clamp(self.min_tap, self.max_tap)
    }

    pub fn min_angle(&self) -> f64 {
        self.angle(self.min_tap)
    }

    pub fn max_angle(&self) -> f64 {
        self.angle(self.max_tap)
    }
}

/// The continuous-lever variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RangeActionKind {
    /// PST tap, optimized as a continuous angle and rounded back to taps
    PstTap(TapToAngle),
    /// HVDC active-power setpoint (MW)
    HvdcSetpoint { min_mw: f64, max_mw: f64 },
    /// Generator/load injection setpoint (MW)
    InjectionSetpoint { min_mw: f64, max_mw: f64 },
}

/// A remedial action with a continuous setpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeAction {
    pub id: String,
    /// Operator (TSO) owning the action, for usage-limit accounting
    pub operator: String,
    pub kind: RangeActionKind,
}

impl RangeAction {
    /// Setpoint bounds in the optimization domain (degrees for PSTs, MW
    /// otherwise).
    pub fn bounds(&self) -> (f64, f64) {
        match &self.kind {
            RangeActionKind::PstTap(conv) => (conv.min_angle(), conv.max_angle()),
            RangeActionKind::HvdcSetpoint { min_mw, max_mw }
            | RangeActionKind::InjectionSetpoint { min_mw, max_mw } => (*min_mw, *max_mw),
        }
    }

    pub fn is_pst(&self) -> bool {
        matches!(self.kind, RangeActionKind::PstTap(_))
    }

    /// Setpoint currently recorded in `state`, defaulting to 0 (neutral tap,
    /// no injection) for untouched elements.
    pub fn current_setpoint(&self, state: &NetworkState) -> f64 {
        match &self.kind {
            RangeActionKind::PstTap(conv) => {
                conv.angle(state.pst_tap(&self.id).unwrap_or(0))
            }
            RangeActionKind::HvdcSetpoint { .. } | RangeActionKind::InjectionSetpoint { .. } => {
                state.setpoint(&self.id).unwrap_or(0.0)
            }
        }
    }

    /// Feasible setpoint nearest to a continuous LP solution.
    ///
    /// For PSTs this is the rounded tap's angle; continuous kinds pass
    /// through unchanged.
    pub fn round_setpoint(&self, setpoint: f64) -> f64 {
        match &self.kind {
            RangeActionKind::PstTap(conv) => conv.angle(conv.nearest_tap(setpoint)),
            _ => setpoint,
        }
    }

    /// Tap position corresponding to a setpoint, for PSTs only.
    pub fn tap_for(&self, setpoint: f64) -> Option<i32> {
        match &self.kind {
            RangeActionKind::PstTap(conv) => Some(conv.nearest_tap(setpoint)),
            _ => None,
        }
    }

    /// Write a (feasible) setpoint into the network state.
    pub fn apply(&self, state: &mut NetworkState, setpoint: f64) {
        match &self.kind {
            RangeActionKind::PstTap(conv) => {
                state.set_pst_tap(self.id.clone(), conv.nearest_tap(setpoint));
            }
            RangeActionKind::HvdcSetpoint { .. } | RangeActionKind::InjectionSetpoint { .. } => {
                state.set_setpoint(self.id.clone(), setpoint);
            }
        }
    }
}

/// Applicability rule of a network action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageRule {
    /// Available in every state
    Free,
    /// Available at a given instant, whatever the contingency
    OnInstant(Instant),
    /// Available only in one post-contingency state
    OnContingencyState {
        contingency: String,
        instant: Instant,
    },
    /// Available only while the named CNEC is constrained (negative margin)
    OnConstraint { cnec: String },
}

/// The discrete-lever variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetworkActionKind {
    /// Open a switchable element
    OpenSwitch { element: String },
    /// Close a switchable element
    CloseSwitch { element: String },
    /// Force an element to a discrete setpoint (MW)
    DiscreteSetpoint { element: String, value_mw: f64 },
}

/// A discrete remedial action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAction {
    pub id: String,
    pub operator: String,
    pub kind: NetworkActionKind,
    pub usage_rules: Vec<UsageRule>,
}

impl NetworkAction {
    /// Topological actions count against the dedicated topology caps.
    pub fn is_topological(&self) -> bool {
        matches!(
            self.kind,
            NetworkActionKind::OpenSwitch { .. } | NetworkActionKind::CloseSwitch { .. }
        )
    }

    /// Whether this action may be activated in the given perimeter.
    ///
    /// `constrained_cnecs` holds the ids of CNECs currently showing a
    /// negative margin, which is what arms `OnConstraint` rules.
    pub fn is_available(
        &self,
        instant: Instant,
        contingency: Option<&str>,
        constrained_cnecs: &HashSet<String>,
    ) -> bool {
        self.usage_rules.iter().any(|rule| match rule {
            UsageRule::Free => true,
            UsageRule::OnInstant(i) => *i == instant,
            UsageRule::OnContingencyState {
                contingency: c,
                instant: i,
            } => *i == instant && contingency == Some(c.as_str()),
            UsageRule::OnConstraint { cnec } => constrained_cnecs.contains(cnec),
        })
    }

    pub fn apply(&self, state: &mut NetworkState) {
        match &self.kind {
            NetworkActionKind::OpenSwitch { element } => {
                state.set_switch_closed(element.clone(), false);
            }
            NetworkActionKind::CloseSwitch { element } => {
                state.set_switch_closed(element.clone(), true);
            }
            NetworkActionKind::DiscreteSetpoint { element, value_mw } => {
                state.set_setpoint(element.clone(), *value_mw);
            }
        }
    }
}
