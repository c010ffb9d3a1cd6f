//! Committed trajectories shared by the fleet.
//!
//! The planner only ever reads the schedule through the [`Schedule`] trait,
//! taking one snapshot per solve. [`Database`] is the in-memory store used by
//! the server and the tests.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::domain::{Time, Trajectory};

/// Filter for schedule queries. Every set field must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    map_name: Option<String>,
    window: Option<(Time, Time)>,
}

impl Query {
    /// Matches every trajectory.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Matches trajectories on the given map.
    pub fn on_map(map_name: impl Into<String>) -> Self {
        Self {
            map_name: Some(map_name.into()),
            window: None,
        }
    }

    /// Matches trajectories whose time range intersects `[start, finish]`.
    pub fn overlapping(start: Time, finish: Time) -> Self {
        Self {
            map_name: None,
            window: Some((start, finish)),
        }
    }

    /// Further restricts the query to a time window.
    pub fn during(mut self, start: Time, finish: Time) -> Self {
        self.window = Some((start, finish));
        self
    }

    /// Whether `trajectory` passes the filter. Empty trajectories have no
    /// time range and never match a windowed query.
    pub fn matches(&self, trajectory: &Trajectory) -> bool {
        if let Some(map) = &self.map_name {
            if trajectory.map_name() != map {
                return false;
            }
        }
        if let Some((start, finish)) = self.window {
            return match (trajectory.start_time(), trajectory.finish_time()) {
                (Some(first), Some(last)) => first <= finish && start <= last,
                _ => false,
            };
        }
        true
    }
}

/// Read access to committed trajectories.
pub trait Schedule {
    /// Returns every committed trajectory matching `query`.
    ///
    /// The result is a consistent snapshot: later commits never show up in
    /// it.
    fn query(&self, query: &Query) -> Vec<Arc<Trajectory>>;
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    version: u64,
    entries: BTreeMap<u64, Arc<Trajectory>>,
}

impl Inner {
    fn commit(&mut self, trajectory: Trajectory) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.version += 1;
        debug!(
            entry = id,
            map = trajectory.map_name(),
            segments = trajectory.len(),
            "committed trajectory"
        );
        self.entries.insert(id, Arc::new(trajectory));
        id
    }
}

/// Thread-safe in-memory schedule.
///
/// Cloning shares the underlying store.
#[derive(Debug, Clone, Default)]
pub struct Database {
    inner: Arc<RwLock<Inner>>,
}

impl Database {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a trajectory and return its entry id.
    pub fn insert(&self, trajectory: Trajectory) -> u64 {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.commit(trajectory)
    }

    /// Commit a trajectory only if `accept` approves it against every
    /// current entry. No other commit can land between the check and the
    /// insert. Returns `None` when rejected.
    pub fn insert_if(
        &self,
        trajectory: Trajectory,
        accept: impl FnOnce(&Trajectory, &[Arc<Trajectory>]) -> bool,
    ) -> Option<u64> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let current: Vec<Arc<Trajectory>> = inner.entries.values().cloned().collect();
        if !accept(&trajectory, &current) {
            debug!(map = trajectory.map_name(), "commit rejected");
            return None;
        }
        Some(inner.commit(trajectory))
    }

    /// Withdraw a committed trajectory.
    pub fn remove(&self, id: u64) -> Option<Arc<Trajectory>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.entries.remove(&id);
        if removed.is_some() {
            inner.version += 1;
        }
        removed
    }

    /// Look up one entry.
    pub fn get(&self, id: u64) -> Option<Arc<Trajectory>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(&id).cloned()
    }

    /// Every entry with its id, in commit order, plus the version it was
    /// read at.
    pub fn entries(&self) -> (u64, Vec<(u64, Arc<Trajectory>)>) {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let entries = inner
            .entries
            .iter()
            .map(|(id, t)| (*id, Arc::clone(t)))
            .collect();
        (inner.version, entries)
    }

    /// Incremented on every change.
    pub fn version(&self) -> u64 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).version
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Schedule for Database {
    fn query(&self, query: &Query) -> Vec<Arc<Trajectory>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect()
    }
}

impl<S: Schedule + ?Sized> Schedule for &S {
    fn query(&self, query: &Query) -> Vec<Arc<Trajectory>> {
        (**self).query(query)
    }
}
