//! Discrete search tree over network-action combinations.
//!
//! Exploration is greedy and depth-wise: from the incumbent leaf, every
//! available not-yet-applied network action spawns one child; children are
//! evaluated in parallel, each on an exclusive clone of the root state; the
//! cheapest surviving child becomes the new incumbent. Children are pruned
//! before evaluation when they would break usage limits, and after
//! evaluation when their improvement over the incumbent stays below the
//! configured impact thresholds. A leaf never revisits an action set already
//! explored anywhere in the run.
//!
//! Leaf-local failures (sensitivity, solver) discard that leaf and leave its
//! siblings alone; only a configuration error at setup aborts the search.

use crate::objective::ObjectiveFunction;
use crate::params::RaoParameters;
use crate::result::{LeafDisposition, LeafRecord, RaoRunResult};
use crate::search::leaf::{evaluate_leaf, ActionIdSet, Leaf, LeafContext, LeafStatus};
use crate::sensitivity::{SensitivityEngine, SensitivityProvider};
use rao_core::{
    Cnec, Instant, NetworkAction, NetworkState, RangeAction, RaoError, RaoResult, StatePool,
    UsageLimits,
};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything one search run needs besides the initial state.
pub struct SearchTreeConfig {
    pub cnecs: Vec<Cnec>,
    pub range_actions: Vec<RangeAction>,
    pub network_actions: Vec<NetworkAction>,
    pub limits: UsageLimits,
    pub params: RaoParameters,
    /// Instant of the optimized perimeter
    pub instant: Instant,
    /// Contingency of the optimized perimeter, `None` for the basecase
    pub contingency: Option<String>,
}

pub struct SearchTree {
    config: SearchTreeConfig,
    objective: ObjectiveFunction,
    provider: Arc<dyn SensitivityProvider>,
}

impl SearchTree {
    /// Validates the configuration; a cross-check failure here aborts the
    /// whole run before anything is evaluated.
    pub fn new(
        config: SearchTreeConfig,
        provider: Arc<dyn SensitivityProvider>,
    ) -> RaoResult<Self> {
        config.limits.validate()?;
        let objective =
            ObjectiveFunction::standard(&config.params, &config.cnecs, &config.limits);
        Ok(Self {
            config,
            objective,
            provider,
        })
    }

    pub fn run(&self, initial_state: NetworkState) -> RaoResult<RaoRunResult> {
        self.run_cancellable(initial_state, &AtomicBool::new(false))
    }

    /// Run the search; once `cancel` is raised no new leaves are scheduled,
    /// but the depth being evaluated finishes and its best leaf counts.
    pub fn run_cancellable(
        &self,
        initial_state: NetworkState,
        cancel: &AtomicBool,
    ) -> RaoResult<RaoRunResult> {
        let start = std::time::Instant::now();
        let params = &self.config.params;

        let leaf_ctx = LeafContext {
            cnecs: &self.config.cnecs,
            range_actions: &self.config.range_actions,
            network_actions: &self.config.network_actions,
            limits: &self.config.limits,
            params,
            objective: &self.objective,
        };
        let base_engine = SensitivityEngine::new(
            Arc::clone(&self.provider),
            params.sensitivity.clone(),
            params.fallback_sensitivity.clone(),
        );

        let mut pool = StatePool::new();
        let root_handle = pool.insert(initial_state);

        // a root failure leaves no branch to continue with, so it aborts
        let mut incumbent = Leaf::root();
        let root_state = pool.get(root_handle)?.clone();
        incumbent.mark_evaluated(evaluate_leaf(
            &leaf_ctx,
            &incumbent.actions,
            root_state,
            base_engine.fresh_branch(),
        )?);

        let mut records = vec![record_for_evaluated(&incumbent)];
        let mut explored: HashSet<ActionIdSet> = HashSet::from([incumbent.actions.clone()]);
        let mut depth_reached = 0;

        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(params.leaf_parallelism.max(1))
            .build()
            .map_err(|e| RaoError::Other(format!("failed to build leaf worker pool: {e}")))?;

        for depth in 1..=params.max_search_depth {
            if cancel.load(Ordering::Relaxed) {
                info!(depth, "search cancelled, no further leaves scheduled");
                break;
            }

            let constrained = self.constrained_cnecs(&incumbent);
            let mut jobs: Vec<(Leaf, NetworkState)> = Vec::new();
            for action in &self.config.network_actions {
                if incumbent.actions.contains(&action.id) {
                    continue;
                }
                if !action.is_available(
                    self.config.instant,
                    self.config.contingency.as_deref(),
                    &constrained,
                ) {
                    continue;
                }
                let mut leaf = Leaf::child(&incumbent, &action.id);
                if !explored.insert(leaf.actions.clone()) {
                    debug!(action = %action.id, "combination already explored, skipping");
                    continue;
                }
                let refs: Vec<&NetworkAction> = leaf
                    .actions
                    .iter()
                    .map(|id| leaf_ctx.network_action(id))
                    .collect::<RaoResult<_>>()?;
                if !self.config.limits.admits(&refs) {
                    leaf.status = LeafStatus::Pruned;
                    records.push(LeafRecord {
                        depth,
                        actions: leaf.action_list(),
                        disposition: LeafDisposition::Pruned {
                            reason: "usage limits exceeded".into(),
                        },
                    });
                    continue;
                }
                let fork = pool.fork(root_handle)?;
                jobs.push((leaf, pool.take(fork)?));
            }

            if jobs.is_empty() {
                debug!(depth, "no candidate leaves left");
                break;
            }

            let evaluated: Vec<(Leaf, Option<RaoError>)> = workers.install(|| {
                jobs.into_par_iter()
                    .map(|(mut leaf, state)| {
                        match evaluate_leaf(
                            &leaf_ctx,
                            &leaf.actions,
                            state,
                            base_engine.fresh_branch(),
                        ) {
                            Ok(evaluation) => {
                                leaf.mark_evaluated(evaluation);
                                (leaf, None)
                            }
                            Err(err) => (leaf, Some(err)),
                        }
                    })
                    .collect()
            });
            depth_reached = depth;

            let parent_cost = incumbent.total_cost().unwrap_or(f64::INFINITY);
            let mut best_child: Option<Leaf> = None;
            for (mut leaf, error) in evaluated {
                if let Some(err) = error {
                    warn!(actions = ?leaf.action_list(), error = %err, "leaf discarded");
                    records.push(LeafRecord {
                        depth,
                        actions: leaf.action_list(),
                        disposition: LeafDisposition::Discarded {
                            error: err.to_string(),
                        },
                    });
                    continue;
                }
                let cost = leaf.total_cost().unwrap_or(f64::INFINITY);
                let improvement = parent_cost - cost;
                if improvement < params.absolute_impact_threshold
                    || improvement < params.relative_impact_threshold * parent_cost.abs()
                {
                    leaf.status = LeafStatus::Pruned;
                    records.push(LeafRecord {
                        depth,
                        actions: leaf.action_list(),
                        disposition: LeafDisposition::Pruned {
                            reason: format!("improvement {improvement:.3} below impact threshold"),
                        },
                    });
                    continue;
                }
                records.push(record_for_evaluated(&leaf));
                let is_better = best_child
                    .as_ref()
                    .and_then(Leaf::total_cost)
                    .map_or(true, |best| cost < best);
                if is_better {
                    best_child = Some(leaf);
                }
            }

            match best_child {
                Some(child) => {
                    info!(
                        depth,
                        actions = ?child.action_list(),
                        cost = child.total_cost().unwrap_or(f64::INFINITY),
                        "expanding best leaf"
                    );
                    incumbent.status = LeafStatus::Expanded;
                    incumbent = child;
                }
                None => {
                    info!(depth, "no leaf improves the incumbent enough, stopping");
                    break;
                }
            }
        }

        pool.release(root_handle);

        let evaluation = incumbent
            .evaluation
            .ok_or_else(|| RaoError::Other("incumbent leaf was never evaluated".into()))?;
        Ok(RaoRunResult {
            instant: self.config.instant,
            contingency: self.config.contingency.clone(),
            network_actions: incumbent.actions.into_iter().collect(),
            range_actions: evaluation.outcome.activations,
            objective: evaluation.outcome.objective,
            sensitivity_fallback: evaluation.fallback,
            leaves: records,
            depth_reached,
            run_time_ms: start.elapsed().as_millis(),
        })
    }

    /// Ids of monitored elements currently overloaded under the incumbent's
    /// flows; these arm on-constraint usage rules.
    fn constrained_cnecs(&self, incumbent: &Leaf) -> HashSet<String> {
        let Some(evaluation) = incumbent.evaluation.as_ref() else {
            return HashSet::new();
        };
        self.config
            .cnecs
            .iter()
            .filter(|c| c.optimized || c.monitored)
            .filter_map(|c| {
                let flow = evaluation.outcome.sensitivity.reference_flow(&c.id).ok()?;
                (c.margin_mw(flow) < 0.0).then(|| c.id.clone())
            })
            .collect()
    }
}

fn record_for_evaluated(leaf: &Leaf) -> LeafRecord {
    let (total_cost, fallback) = leaf
        .evaluation
        .as_ref()
        .map(|e| (e.outcome.objective.total_cost(), e.fallback))
        .unwrap_or((f64::INFINITY, false));
    LeafRecord {
        depth: leaf.depth,
        actions: leaf.action_list(),
        disposition: LeafDisposition::Evaluated {
            total_cost,
            fallback,
        },
    }
}
