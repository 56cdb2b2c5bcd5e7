//! Flow and margin unit handling.
//!
//! Margins, thresholds and virtual costs are only comparable when expressed
//! in the same unit. Sensitivities are always computed in the MW domain; when
//! the objective is configured in Ampere, MW-domain quantities are rescaled
//! at a branch's nominal voltage instead of re-deriving sensitivities.
//!
//! Conversion law for a three-phase branch at nominal voltage U (kV):
//! `P[MW] = √3 · U[kV] · I[A] / 1000`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit in which flows, margins and costs are expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Megawatt domain (native domain of the sensitivity provider)
    #[default]
    Megawatt,
    /// Ampere domain (rescaled per branch at its nominal voltage)
    Ampere,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Megawatt => write!(f, "MW"),
            Unit::Ampere => write!(f, "A"),
        }
    }
}

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Convert an MW quantity to Ampere at the given nominal voltage (kV).
pub fn megawatt_to_ampere(mw: f64, nominal_voltage_kv: f64) -> f64 {
    mw * 1000.0 / (SQRT_3 * nominal_voltage_kv)
}

/// Convert an Ampere quantity to MW at the given nominal voltage (kV).
pub fn ampere_to_megawatt(ampere: f64, nominal_voltage_kv: f64) -> f64 {
    ampere * SQRT_3 * nominal_voltage_kv / 1000.0
}

/// Express an MW-domain quantity in `unit` at the given nominal voltage.
pub fn from_megawatt(mw: f64, unit: Unit, nominal_voltage_kv: f64) -> f64 {
    match unit {
        Unit::Megawatt => mw,
        Unit::Ampere => megawatt_to_ampere(mw, nominal_voltage_kv),
    }
}

/// Coefficient turning one `unit` of a variable into MW.
///
/// Used by LP fillers to keep constraints in the MW domain while the margin
/// variable lives in the configured unit.
pub fn megawatt_per_unit(unit: Unit, nominal_voltage_kv: f64) -> f64 {
    match unit {
        Unit::Megawatt => 1.0,
        Unit::Ampere => ampere_to_megawatt(1.0, nominal_voltage_kv),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mw_ampere_round_trip() {
        let mw = 750.0;
        let kv = 400.0;
        let back = ampere_to_megawatt(megawatt_to_ampere(mw, kv), kv);
        assert!((back - mw).abs() < 1e-6);
    }

    #[test]
    fn test_known_conversion() {
        // √3 · 400 kV · 1443.38 A / 1000 ≈ 1000 MW
        let amps = megawatt_to_ampere(1000.0, 400.0);
        assert!((amps - 1443.375_672_974_065).abs() < 1e-6);
    }

    #[test]
    fn test_from_megawatt_identity_in_mw() {
        assert_eq!(from_megawatt(123.4, Unit::Megawatt, 225.0), 123.4);
    }

    #[test]
    fn test_megawatt_per_unit() {
        assert_eq!(megawatt_per_unit(Unit::Megawatt, 400.0), 1.0);
        let c = megawatt_per_unit(Unit::Ampere, 400.0);
        assert!((c - ampere_to_megawatt(1.0, 400.0)).abs() < 1e-12);
    }

    #[test]
    fn test_unit_serde_round_trip() {
        let json = serde_json::to_string(&Unit::Ampere).unwrap();
        assert_eq!(json, "\"ampere\"");
        let unit: Unit = serde_json::from_str(&json).unwrap();
        assert_eq!(unit, Unit::Ampere);
    }
}
