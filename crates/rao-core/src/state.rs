//! Network-state snapshots and their handle-based pool.
//!
//! A [`NetworkState`] is a mutable snapshot of the controllable quantities of
//! the grid: PST tap positions, continuous setpoints (HVDC, injections) and
//! switch positions. The topology itself lives behind the sensitivity
//! provider; the engine only tracks what remedial actions change.
//!
//! Snapshots are owned by exactly one optimization branch at a time. The
//! [`StatePool`] hands them out through integer [`StateHandle`]s with an
//! explicit fork/take/release lifecycle tied to search-tree leaf creation and
//! destruction, so branch ownership is visible in the type system instead of
//! being keyed by string variant ids.

use crate::error::{RaoError, RaoResult};
use std::collections::HashMap;

/// Mutable snapshot of controllable grid quantities.
#[derive(Debug, Clone, Default)]
pub struct NetworkState {
    pst_taps: HashMap<String, i32>,
    setpoints: HashMap<String, f64>,
    switches: HashMap<String, bool>,
}

impl NetworkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tap position of a PST, if one has been recorded.
    pub fn pst_tap(&self, element: &str) -> Option<i32> {
        self.pst_taps.get(element).copied()
    }

    pub fn set_pst_tap(&mut self, element: impl Into<String>, tap: i32) {
        self.pst_taps.insert(element.into(), tap);
    }

    /// Current continuous setpoint (MW) of an HVDC or injection element.
    pub fn setpoint(&self, element: &str) -> Option<f64> {
        self.setpoints.get(element).copied()
    }

    pub fn set_setpoint(&mut self, element: impl Into<String>, value_mw: f64) {
        self.setpoints.insert(element.into(), value_mw);
    }

    /// Switch position; elements never touched by an action are absent.
    pub fn switch_closed(&self, element: &str) -> Option<bool> {
        self.switches.get(element).copied()
    }

    pub fn set_switch_closed(&mut self, element: impl Into<String>, closed: bool) {
        self.switches.insert(element.into(), closed);
    }
}

/// Integer handle into a [`StatePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateHandle(usize);

impl StateHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Slab-style pool of [`NetworkState`] snapshots.
///
/// Freed slots are recycled, so handle churn from pruned leaves does not grow
/// the pool. Handles are invalidated by `take` and `release`; using a stale
/// handle is an error, never a silent empty state.
#[derive(Debug, Default)]
pub struct StatePool {
    slots: Vec<Option<NetworkState>>,
    free: Vec<usize>,
}

impl StatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live snapshots.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Insert a snapshot and return its handle.
    pub fn insert(&mut self, state: NetworkState) -> StateHandle {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(state);
            StateHandle(idx)
        } else {
            self.slots.push(Some(state));
            StateHandle(self.slots.len() - 1)
        }
    }

    pub fn get(&self, handle: StateHandle) -> RaoResult<&NetworkState> {
        self.slots
            .get(handle.0)
            .and_then(|s| s.as_ref())
            .ok_or(RaoError::InvalidHandle(handle.0))
    }

    pub fn get_mut(&mut self, handle: StateHandle) -> RaoResult<&mut NetworkState> {
        self.slots
            .get_mut(handle.0)
            .and_then(|s| s.as_mut())
            .ok_or(RaoError::InvalidHandle(handle.0))
    }

    /// Clone the snapshot behind `handle` into a fresh slot.
    ///
    /// This is the leaf-creation operation: the parent keeps its snapshot,
    /// the child gets an exclusive copy.
    pub fn fork(&mut self, handle: StateHandle) -> RaoResult<StateHandle> {
        let clone = self.get(handle)?.clone();
        Ok(self.insert(clone))
    }

    /// Move the snapshot out of the pool, freeing the slot.
    ///
    /// Used to hand a worker exclusive ownership for parallel evaluation.
    pub fn take(&mut self, handle: StateHandle) -> RaoResult<NetworkState> {
        let slot = self
            .slots
            .get_mut(handle.0)
            .ok_or(RaoError::InvalidHandle(handle.0))?;
        let state = slot.take().ok_or(RaoError::InvalidHandle(handle.0))?;
        self.free.push(handle.0);
        Ok(state)
    }

    /// Drop the snapshot behind `handle` (pruned or superseded leaf).
    pub fn release(&mut self, handle: StateHandle) {
        if let Some(slot) = self.slots.get_mut(handle.0) {
            if slot.take().is_some() {
                self.free.push(handle.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_accessors() {
        let mut state = NetworkState::new();
        state.set_pst_tap("pst-be-fr", 5);
        state.set_setpoint("hvdc-1", 120.0);
        state.set_switch_closed("line-2", false);

        assert_eq!(state.pst_tap("pst-be-fr"), Some(5));
        assert_eq!(state.setpoint("hvdc-1"), Some(120.0));
        assert_eq!(state.switch_closed("line-2"), Some(false));
        assert_eq!(state.pst_tap("unknown"), None);
    }

    #[test]
    fn test_pool_fork_is_independent() {
        let mut pool = StatePool::new();
        let mut root = NetworkState::new();
        root.set_pst_tap("pst", 0);
        let root_h = pool.insert(root);

        let child_h = pool.fork(root_h).unwrap();
        pool.get_mut(child_h).unwrap().set_pst_tap("pst", 7);

        assert_eq!(pool.get(root_h).unwrap().pst_tap("pst"), Some(0));
        assert_eq!(pool.get(child_h).unwrap().pst_tap("pst"), Some(7));
    }

    #[test]
    fn test_pool_take_invalidates_handle() {
        let mut pool = StatePool::new();
        let h = pool.insert(NetworkState::new());
        let _state = pool.take(h).unwrap();

        assert!(matches!(pool.get(h), Err(RaoError::InvalidHandle(_))));
        assert!(matches!(pool.take(h), Err(RaoError::InvalidHandle(_))));
    }

    #[test]
    fn test_pool_recycles_released_slots() {
        let mut pool = StatePool::new();
        let a = pool.insert(NetworkState::new());
        let _b = pool.insert(NetworkState::new());
        pool.release(a);
        assert_eq!(pool.live_count(), 1);

        let c = pool.insert(NetworkState::new());
        assert_eq!(c.index(), a.index());
        assert_eq!(pool.live_count(), 2);
    }
}
