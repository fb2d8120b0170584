//! Process directory: live records, join waiters and exit tombstones.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::sync::Mutex;

use nos_hal::HAL;

use crate::process::ProcessRecord;
use crate::sync::lock;
use crate::types::SpaceId;

/// Outcome of registering a join request.
pub enum JoinTicket<H: HAL> {
    /// Target is alive; wait on its join gate
    Pending(Arc<ProcessRecord<H>>),
    /// Target already exited with this status
    AlreadyExited(i32),
    /// No process with this id ever existed
    Unknown,
}

impl<H: HAL> core::fmt::Debug for JoinTicket<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            JoinTicket::Pending(target) => write!(f, "Pending({})", target.space_id()),
            JoinTicket::AlreadyExited(status) => write!(f, "AlreadyExited({})", status),
            JoinTicket::Unknown => f.write_str("Unknown"),
        }
    }
}

struct DirectoryState<H: HAL> {
    records: BTreeMap<SpaceId, Arc<ProcessRecord<H>>>,
    /// target -> processes blocked joining it
    waiters: BTreeMap<SpaceId, BTreeSet<SpaceId>>,
    /// exited id -> exit status
    exited: BTreeMap<SpaceId, i32>,
    next_id: u32,
}

/// Map from space id to process record.
///
/// Ids come from a monotonic counter and are never reused; an exited
/// process leaves a tombstone with its status.
pub struct ProcessDirectory<H: HAL> {
    state: Mutex<DirectoryState<H>>,
}

impl<H: HAL> ProcessDirectory<H> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DirectoryState {
                records: BTreeMap::new(),
                waiters: BTreeMap::new(),
                exited: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Hand out a fresh space id.
    pub fn reserve_id(&self) -> SpaceId {
        let mut state = lock(&self.state);
        let id = SpaceId(state.next_id);
        state.next_id += 1;
        id
    }

    /// Insert a record.
    ///
    /// # Panics
    /// If a record with the same id is already registered or has exited.
    pub fn register(&self, record: Arc<ProcessRecord<H>>) {
        let mut state = lock(&self.state);
        let id = record.space_id();
        assert!(
            !state.exited.contains_key(&id),
            "space id {} reused after exit",
            id
        );
        let previous = state.records.insert(id, record);
        assert!(previous.is_none(), "space id {} registered twice", id);
    }

    pub fn get(&self, id: SpaceId) -> Option<Arc<ProcessRecord<H>>> {
        lock(&self.state).records.get(&id).cloned()
    }

    /// Number of live processes.
    pub fn len(&self) -> usize {
        lock(&self.state).records.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).records.is_empty()
    }

    pub fn contains(&self, id: SpaceId) -> bool {
        lock(&self.state).records.contains_key(&id)
    }

    /// Exit status of a process that has exited.
    pub fn is_exited(&self, id: SpaceId) -> Option<i32> {
        lock(&self.state).exited.get(&id).copied()
    }

    /// Processes currently blocked joining `target`.
    pub fn waiters_of(&self, target: SpaceId) -> Vec<SpaceId> {
        lock(&self.state)
            .waiters
            .get(&target)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Live space ids in ascending order.
    pub fn ids(&self) -> Vec<SpaceId> {
        lock(&self.state).records.keys().copied().collect()
    }

    /// Every live record, in id order.
    pub fn live(&self) -> Vec<Arc<ProcessRecord<H>>> {
        lock(&self.state).records.values().cloned().collect()
    }

    /// Record `waiter` as joining `target`.
    ///
    /// Decided under the directory lock, so a racing exit of `target` is
    /// seen either as a live record or as a tombstone.
    pub fn add_join_waiter(&self, waiter: SpaceId, target: SpaceId) -> JoinTicket<H> {
        let mut state = lock(&self.state);
        if let Some(record) = state.records.get(&target).cloned() {
            state.waiters.entry(target).or_default().insert(waiter);
            return JoinTicket::Pending(record);
        }
        match state.exited.get(&target) {
            Some(status) => JoinTicket::AlreadyExited(*status),
            None => JoinTicket::Unknown,
        }
    }

    /// Drop `waiter` from `target`'s waiter set after it woke.
    pub fn remove_join_waiter(&self, waiter: SpaceId, target: SpaceId) {
        let mut state = lock(&self.state);
        if let Some(set) = state.waiters.get_mut(&target) {
            set.remove(&waiter);
            if set.is_empty() {
                state.waiters.remove(&target);
            }
        }
    }

    /// Remove an exiting process and leave its tombstone.
    ///
    /// Returns the ids of processes that were waiting on it.
    ///
    /// # Panics
    /// If the record is not registered (double exit).
    pub fn on_exit(&self, record: &ProcessRecord<H>, status: i32) -> Vec<SpaceId> {
        let mut state = lock(&self.state);
        let id = record.space_id();
        let removed = state.records.remove(&id);
        assert!(removed.is_some(), "space id {} exited twice", id);
        state.exited.insert(id, status);
        state
            .waiters
            .remove(&id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }
}

impl<H: HAL> Default for ProcessDirectory<H> {
    fn default() -> Self {
        Self::new()
    }
}
