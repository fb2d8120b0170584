//! Console arbitration.
//!
//! There is one console device per machine. Each top-level process tree gets
//! a lease on it: the top-level process acquires the lease, its Exec/Fork
//! descendants hold clones of the same `Arc`, and only the top-level process
//! frees it at exit.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use nos_hal::ConsoleDevice;

use crate::error::KernelError;
use crate::sync::lock;
use crate::types::SpaceId;

/// Console lease identifier
pub type LeaseId = u64;

/// A process tree's handle on the console device.
pub struct ConsoleLease {
    id: LeaseId,
    holder: SpaceId,
    device: Arc<dyn ConsoleDevice>,
    released: AtomicBool,
}

impl ConsoleLease {
    pub fn id(&self) -> LeaseId {
        self.id
    }

    /// The top-level process that acquired the lease.
    pub fn holder(&self) -> SpaceId {
        self.holder
    }

    /// Whether the top-level holder has already freed this lease.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Block for one byte of console input. `None` after shutdown.
    pub fn get_char(&self) -> Option<u8> {
        self.device.get_char()
    }

    /// Emit one byte of console output.
    pub fn put_char(&self, byte: u8) {
        self.device.put_char(byte)
    }
}

impl core::fmt::Debug for ConsoleLease {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConsoleLease")
            .field("id", &self.id)
            .field("holder", &self.holder)
            .field("released", &self.is_released())
            .finish()
    }
}

struct ArbiterState {
    active: BTreeMap<LeaseId, SpaceId>,
    next_id: LeaseId,
}

/// Owner of the console device; grants and revokes leases.
pub struct ConsoleArbiter {
    device: Arc<dyn ConsoleDevice>,
    state: Mutex<ArbiterState>,
    limit: Option<usize>,
}

impl ConsoleArbiter {
    /// Create an arbiter for `device`. `limit` caps concurrent leases.
    pub fn new(device: Arc<dyn ConsoleDevice>, limit: Option<usize>) -> Self {
        Self {
            device,
            state: Mutex::new(ArbiterState {
                active: BTreeMap::new(),
                next_id: 1,
            }),
            limit,
        }
    }

    /// Grant a new lease to the top-level process `holder`.
    ///
    /// Returns `None` when the lease limit is reached.
    pub fn allocate(&self, holder: SpaceId) -> Option<Arc<ConsoleLease>> {
        let mut state = lock(&self.state);
        if let Some(limit) = self.limit {
            if state.active.len() >= limit {
                return None;
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        state.active.insert(id, holder);

        Some(Arc::new(ConsoleLease {
            id,
            holder,
            device: Arc::clone(&self.device),
            released: AtomicBool::new(false),
        }))
    }

    /// Return a lease to the arbiter.
    ///
    /// # Returns
    /// * `Err(KernelError::LeaseAlreadyReleased)` - the lease was freed before
    pub fn free(&self, lease: &ConsoleLease) -> Result<(), KernelError> {
        let mut state = lock(&self.state);
        if lease.released.swap(true, Ordering::AcqRel) {
            return Err(KernelError::LeaseAlreadyReleased(lease.id));
        }
        state.active.remove(&lease.id);
        Ok(())
    }

    /// Number of leases currently held.
    pub fn active_leases(&self) -> usize {
        lock(&self.state).active.len()
    }

    /// Whether `holder` currently holds a lease.
    pub fn is_holder(&self, holder: SpaceId) -> bool {
        lock(&self.state).active.values().any(|h| *h == holder)
    }

    /// Shut the device down so blocked readers return.
    pub fn shutdown(&self) {
        self.device.shutdown();
    }

    /// Configured lease cap.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullConsole;

    impl ConsoleDevice for NullConsole {
        fn get_char(&self) -> Option<u8> {
            Some(b'\n')
        }
        fn put_char(&self, _byte: u8) {}
        fn shutdown(&self) {}
    }

    fn arbiter(limit: Option<usize>) -> ConsoleArbiter {
        ConsoleArbiter::new(Arc::new(NullConsole), limit)
    }

    #[test]
    fn test_independent_leases() {
        let arbiter = arbiter(None);
        let a = arbiter.allocate(SpaceId(1)).unwrap();
        let b = arbiter.allocate(SpaceId(2)).unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(arbiter.active_leases(), 2);

        arbiter.free(&a).unwrap();
        assert!(a.is_released());
        assert!(!b.is_released());
        assert!(!arbiter.is_holder(SpaceId(1)));
        assert!(arbiter.is_holder(SpaceId(2)));
    }

    #[test]
    fn test_double_free_is_error() {
        let arbiter = arbiter(None);
        let lease = arbiter.allocate(SpaceId(1)).unwrap();

        arbiter.free(&lease).unwrap();
        assert_eq!(
            arbiter.free(&lease),
            Err(KernelError::LeaseAlreadyReleased(lease.id()))
        );
        assert_eq!(arbiter.active_leases(), 0);
    }

    #[test]
    fn test_limit_refuses_extra_leases() {
        let arbiter = arbiter(Some(1));
        let first = arbiter.allocate(SpaceId(1)).unwrap();
        assert!(arbiter.allocate(SpaceId(2)).is_none());

        arbiter.free(&first).unwrap();
        assert!(arbiter.allocate(SpaceId(3)).is_some());
    }

    #[test]
    fn test_released_lease_still_reaches_device() {
        let arbiter = arbiter(None);
        let lease = arbiter.allocate(SpaceId(1)).unwrap();
        arbiter.free(&lease).unwrap();
        assert_eq!(lease.get_char(), Some(b'\n'));
    }
}
