//! Monitored network elements (CNECs).
//!
//! A CNEC is a branch monitored for overload under a given contingency and
//! instant. Optimized CNECs drive the min-margin objective; monitored-only
//! elements (MNECs) are constrained not to worsen beyond an acceptable
//! margin decrease. Either direction of flow can be limited.

use crate::action::Instant;
use crate::units::{from_megawatt, Unit};
use serde::{Deserialize, Serialize};

/// Directional flow limits in MW. `None` means unconstrained in that
/// direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowThreshold {
    pub min_mw: Option<f64>,
    pub max_mw: Option<f64>,
}

impl FlowThreshold {
    pub fn symmetric(limit_mw: f64) -> Self {
        Self {
            min_mw: Some(-limit_mw),
            max_mw: Some(limit_mw),
        }
    }

    pub fn upper_only(limit_mw: f64) -> Self {
        Self {
            min_mw: None,
            max_mw: Some(limit_mw),
        }
    }
}

/// A monitored branch under a given contingency and instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cnec {
    pub id: String,
    /// Operator (TSO) the element belongs to
    pub operator: String,
    /// `None` for basecase monitoring
    pub contingency: Option<String>,
    pub instant: Instant,
    pub threshold: FlowThreshold,
    /// Nominal voltage (kV), used for MW↔A rescaling
    pub nominal_voltage_kv: f64,
    /// Element participates in the min-margin objective
    pub optimized: bool,
    /// Element is margin-protected but not optimized (MNEC)
    pub monitored: bool,
    /// Loop-flow magnitude limit, if the element carries one
    pub loop_flow_threshold_mw: Option<f64>,
    /// Commercial (allocated) flow reference for loop-flow computation
    pub commercial_flow_mw: f64,
    /// Pre-perimeter reference flow, the MNEC baseline
    pub initial_flow_mw: Option<f64>,
}

impl Cnec {
    /// Margin in MW for a given flow: distance to the closest violated or
    /// nearest threshold, negative when overloaded. Unconstrained directions
    /// do not limit.
    pub fn margin_mw(&self, flow_mw: f64) -> f64 {
        let upper = self.threshold.max_mw.map(|max| max - flow_mw);
        let lower = self.threshold.min_mw.map(|min| flow_mw - min);
        match (upper, lower) {
            (Some(u), Some(l)) => u.min(l),
            (Some(u), None) => u,
            (None, Some(l)) => l,
            (None, None) => f64::INFINITY,
        }
    }

    /// Margin expressed in `unit`, rescaled at this element's nominal
    /// voltage.
    pub fn margin(&self, flow_mw: f64, unit: Unit) -> f64 {
        from_megawatt(self.margin_mw(flow_mw), unit, self.nominal_voltage_kv)
    }

    /// Loop flow for a given total flow (zero when no commercial reference
    /// is configured).
    pub fn loop_flow_mw(&self, flow_mw: f64) -> f64 {
        flow_mw - self.commercial_flow_mw
    }

    pub fn is_mnec(&self) -> bool {
        self.monitored && !self.optimized
    }
}

/// Builder-free convenience constructor for the common optimized CNEC.
impl Cnec {
    pub fn optimized(id: impl Into<String>, operator: impl Into<String>, limit_mw: f64) -> Self {
        Self {
            id: id.into(),
            operator: operator.into(),
            contingency: None,
            instant: Instant::Preventive,
            threshold: FlowThreshold::symmetric(limit_mw),
            nominal_voltage_kv: 400.0,
            optimized: true,
            monitored: false,
            loop_flow_threshold_mw: None,
            commercial_flow_mw: 0.0,
            initial_flow_mw: None,
        }
    }
}
