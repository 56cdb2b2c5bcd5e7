//! # rao-core: Remedial-Action Optimization Core Model
//!
//! Fundamental data structures for remedial-action optimization of a
//! transmission network under contingency constraints.
//!
//! ## Design Philosophy
//!
//! The network topology and its physics live behind an external sensitivity
//! provider; this crate only models what the optimizer decides about:
//!
//! - **[`NetworkState`]**: a snapshot of controllable quantities (PST taps,
//!   setpoints, switch positions), pooled behind integer handles with an
//!   explicit fork/take/release lifecycle ([`StatePool`]).
//! - **[`RangeAction`] / [`NetworkAction`]**: closed sum types over the
//!   continuous and discrete remedial-action families, applied by pattern
//!   match.
//! - **[`Cnec`]**: a branch monitored for overload under a contingency and
//!   instant, with directional thresholds and MW↔A rescaling at its nominal
//!   voltage.
//! - **[`UsageLimits`]**: per-operator and global activation caps,
//!   cross-checked at configuration time.
//! - **[`RaoError`]**: the unified error taxonomy shared by the engine.

pub mod action;
pub mod cnec;
pub mod error;
pub mod limits;
pub mod state;
pub mod units;

pub use action::{
    Instant, NetworkAction, NetworkActionKind, RangeAction, RangeActionKind, TapToAngle, UsageRule,
};
pub use cnec::{Cnec, FlowThreshold};
pub use error::{RaoError, RaoResult};
pub use limits::UsageLimits;
pub use state::{NetworkState, StateHandle, StatePool};
pub use units::{ampere_to_megawatt, from_megawatt, megawatt_per_unit, megawatt_to_ampere, Unit};
