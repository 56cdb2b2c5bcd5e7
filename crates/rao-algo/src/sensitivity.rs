//! Sensitivity-computation boundary and its fallback wrapper.
//!
//! The actual load-flow/sensitivity engine is external and swappable: it
//! implements [`SensitivityProvider`] and returns, for one network state,
//! the reference flow on every monitored element and the flow sensitivity to
//! every range-action setpoint.
//!
//! [`SensitivityEngine`] wraps a provider with the fallback-parameter retry
//! protocol: a failure under default parameters is retried once with the
//! fallback set and the branch is marked degraded from then on; a failure
//! while already in fallback mode is fatal for the branch. The mode is
//! monotonic within a branch so results cannot flap between parameter sets.

use crate::params::SensitivityParameters;
use rao_core::{Cnec, NetworkState, RangeAction, RaoError, RaoResult};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Typed failure of one systematic sensitivity computation.
#[derive(Debug, Error)]
pub enum SensitivityError {
    /// The underlying load flow diverged or produced no usable factors.
    #[error("computation diverged: {0}")]
    Diverged(String),

    /// The computation exceeded its wall-clock budget. Treated exactly like
    /// a divergence by the wrapper.
    #[error("computation timed out after {0} s")]
    Timeout(u64),

    /// Any other provider-side failure.
    #[error("{0}")]
    Provider(String),
}

/// Reference flows and sensitivities for one network state.
///
/// Immutable once produced. `fallback` records whether the result was
/// obtained with the degraded parameter set.
#[derive(Debug, Clone)]
pub struct SensitivityResult {
    reference_flows_mw: HashMap<String, f64>,
    /// (range-action id, cnec id) → ∂flow/∂setpoint
    sensitivities: HashMap<(String, String), f64>,
    pub fallback: bool,
}

impl SensitivityResult {
    pub fn new(
        reference_flows_mw: HashMap<String, f64>,
        sensitivities: HashMap<(String, String), f64>,
    ) -> Self {
        Self {
            reference_flows_mw,
            sensitivities,
            fallback: false,
        }
    }

    /// Reference flow on a monitored element, in MW.
    pub fn reference_flow(&self, cnec_id: &str) -> RaoResult<f64> {
        self.reference_flows_mw
            .get(cnec_id)
            .copied()
            .ok_or_else(|| RaoError::UnknownElement(format!("no reference flow for cnec {cnec_id}")))
    }

    /// Flow sensitivity of `cnec_id` to the setpoint of `range_action_id`.
    /// Unreported pairs are zero (the provider prunes negligible factors).
    pub fn sensitivity(&self, range_action_id: &str, cnec_id: &str) -> f64 {
        self.sensitivities
            .get(&(range_action_id.to_string(), cnec_id.to_string()))
            .copied()
            .unwrap_or(0.0)
    }
}

/// External systematic-sensitivity computation service.
pub trait SensitivityProvider: Send + Sync {
    fn compute(
        &self,
        state: &NetworkState,
        cnecs: &[Cnec],
        range_actions: &[RangeAction],
        params: &SensitivityParameters,
    ) -> Result<SensitivityResult, SensitivityError>;
}

/// Parameter mode of one exploration branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterMode {
    Default,
    Fallback,
}

/// Provider wrapper owning the fallback-retry state of one branch.
#[derive(Clone)]
pub struct SensitivityEngine {
    provider: Arc<dyn SensitivityProvider>,
    parameters: SensitivityParameters,
    fallback_parameters: Option<SensitivityParameters>,
    mode: ParameterMode,
}

impl SensitivityEngine {
    pub fn new(
        provider: Arc<dyn SensitivityProvider>,
        parameters: SensitivityParameters,
        fallback_parameters: Option<SensitivityParameters>,
    ) -> Self {
        Self {
            provider,
            parameters,
            fallback_parameters,
            mode: ParameterMode::Default,
        }
    }

    /// Engine for a new independent exploration branch: same provider and
    /// parameter sets, mode reset to default.
    pub fn fresh_branch(&self) -> Self {
        Self {
            mode: ParameterMode::Default,
            ..self.clone()
        }
    }

    pub fn mode(&self) -> ParameterMode {
        self.mode
    }

    pub fn in_fallback(&self) -> bool {
        self.mode == ParameterMode::Fallback
    }

    /// Run one systematic computation, retrying once with fallback
    /// parameters on a first failure.
    pub fn evaluate(
        &mut self,
        state: &NetworkState,
        cnecs: &[Cnec],
        range_actions: &[RangeAction],
    ) -> RaoResult<SensitivityResult> {
        let params = self.active_parameters();
        match self.provider.compute(state, cnecs, range_actions, params) {
            Ok(mut result) => {
                result.fallback = self.in_fallback();
                Ok(result)
            }
            Err(err) if self.mode == ParameterMode::Default => {
                let Some(fallback) = self.fallback_parameters.clone() else {
                    return Err(RaoError::Sensitivity(err.to_string()));
                };
                warn!(error = %err, "sensitivity computation failed, retrying with fallback parameters");
                self.mode = ParameterMode::Fallback;
                let mut result = self
                    .provider
                    .compute(state, cnecs, range_actions, &fallback)
                    .map_err(|retry_err| {
                        RaoError::Sensitivity(format!(
                            "{err}; fallback retry also failed: {retry_err}"
                        ))
                    })?;
                result.fallback = true;
                Ok(result)
            }
            Err(err) => Err(RaoError::Sensitivity(format!(
                "{err} (fallback parameters already active)"
            ))),
        }
    }

    fn active_parameters(&self) -> &SensitivityParameters {
        match self.mode {
            ParameterMode::Default => &self.parameters,
            // fallback mode is only entered when the set exists
            ParameterMode::Fallback => self
                .fallback_parameters
                .as_ref()
                .unwrap_or(&self.parameters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider failing for the first `fail_count` calls.
    struct FlakyProvider {
        calls: AtomicUsize,
        fail_count: usize,
    }

    impl FlakyProvider {
        fn new(fail_count: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_count,
            }
        }
    }

    impl SensitivityProvider for FlakyProvider {
        fn compute(
            &self,
            _state: &NetworkState,
            cnecs: &[Cnec],
            _range_actions: &[RangeAction],
            _params: &SensitivityParameters,
        ) -> Result<SensitivityResult, SensitivityError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_count {
                return Err(SensitivityError::Diverged("mock divergence".into()));
            }
            let flows = cnecs.iter().map(|c| (c.id.clone(), 100.0)).collect();
            Ok(SensitivityResult::new(flows, HashMap::new()))
        }
    }

    fn one_cnec() -> Vec<Cnec> {
        vec![Cnec::optimized("cnec-1", "TSO1", 750.0)]
    }

    fn engine(fail_count: usize, with_fallback: bool) -> SensitivityEngine {
        SensitivityEngine::new(
            Arc::new(FlakyProvider::new(fail_count)),
            SensitivityParameters::default(),
            with_fallback.then(SensitivityParameters::default),
        )
    }

    #[test]
    fn test_success_stays_in_default_mode() {
        let mut engine = engine(0, true);
        let result = engine
            .evaluate(&NetworkState::new(), &one_cnec(), &[])
            .unwrap();
        assert!(!result.fallback);
        assert_eq!(engine.mode(), ParameterMode::Default);
    }

    #[test]
    fn test_first_failure_retries_with_fallback() {
        let mut engine = engine(1, true);
        let result = engine
            .evaluate(&NetworkState::new(), &one_cnec(), &[])
            .unwrap();
        assert!(result.fallback);
        assert_eq!(engine.mode(), ParameterMode::Fallback);
    }

    #[test]
    fn test_fallback_mode_is_monotonic() {
        let mut engine = engine(1, true);
        engine
            .evaluate(&NetworkState::new(), &one_cnec(), &[])
            .unwrap();
        // later successful calls stay tagged as degraded
        let result = engine
            .evaluate(&NetworkState::new(), &one_cnec(), &[])
            .unwrap();
        assert!(result.fallback);
        assert_eq!(engine.mode(), ParameterMode::Fallback);
    }

    #[test]
    fn test_failure_without_fallback_is_fatal() {
        let mut engine = engine(1, false);
        let err = engine
            .evaluate(&NetworkState::new(), &one_cnec(), &[])
            .unwrap_err();
        assert!(matches!(err, RaoError::Sensitivity(_)));
    }

    #[test]
    fn test_second_failure_in_fallback_is_fatal() {
        // fails on calls 0 (default), 1 (fallback retry)
        let mut engine = engine(2, true);
        let err = engine
            .evaluate(&NetworkState::new(), &one_cnec(), &[])
            .unwrap_err();
        assert!(matches!(err, RaoError::Sensitivity(_)));
        // the branch stays in fallback mode for good
        assert_eq!(engine.mode(), ParameterMode::Fallback);
    }

    #[test]
    fn test_fresh_branch_resets_mode() {
        let mut engine = engine(1, true);
        engine
            .evaluate(&NetworkState::new(), &one_cnec(), &[])
            .unwrap();
        assert!(engine.in_fallback());
        let fresh = engine.fresh_branch();
        assert_eq!(fresh.mode(), ParameterMode::Default);
    }
}
