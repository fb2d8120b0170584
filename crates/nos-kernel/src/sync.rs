//! Kernel synchronization primitives.
//!
//! The join gate is built on loom's primitives when the `loom` feature is
//! enabled so its wake-up protocol can be model checked.
//!
//! ```bash
//! cargo test --package nos-kernel --features loom -- --test-threads=1 loom
//! ```

use std::sync::{MutexGuard, PoisonError};

#[cfg(feature = "loom")]
use loom::sync::{Condvar, Mutex};
#[cfg(not(feature = "loom"))]
use std::sync::{Condvar, Mutex};

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One-shot synchronization point signaled when a process exits.
///
/// Starts open. [`JoinGate::signal`] flips it exactly once; every waiter,
/// whether it arrived before or after the signal, returns. Signaling again
/// is a no-op.
pub struct JoinGate {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl JoinGate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self {
            signaled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Signal the gate and wake all waiters.
    ///
    /// Returns `true` on the open→signaled transition, `false` if the gate
    /// was already signaled.
    pub fn signal(&self) -> bool {
        let mut signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        if *signaled {
            return false;
        }
        *signaled = true;
        self.cond.notify_all();
        true
    }

    /// Block until the gate is signaled.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(PoisonError::into_inner);
        while !*signaled {
            signaled = self
                .cond
                .wait(signaled)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether the gate has been signaled.
    pub fn is_signaled(&self) -> bool {
        *self.signaled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for JoinGate {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for JoinGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JoinGate")
            .field("signaled", &self.is_signaled())
            .finish()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_gate_starts_open() {
        let gate = JoinGate::new();
        assert!(!gate.is_signaled());
    }

    #[test]
    fn test_signal_transitions_once() {
        let gate = JoinGate::new();
        assert!(gate.signal());
        assert!(!gate.signal());
        assert!(gate.is_signaled());
    }

    #[test]
    fn test_wait_after_signal_returns() {
        let gate = JoinGate::new();
        gate.signal();
        gate.wait();
    }

    #[test]
    fn test_all_waiters_observe_signal() {
        let gate = Arc::new(JoinGate::new());

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || gate.wait())
            })
            .collect();

        gate.signal();

        for w in waiters {
            w.join().unwrap();
        }
    }
}

#[cfg(all(test, feature = "loom"))]
mod loom_tests {
    use super::JoinGate;
    use loom::sync::Arc;
    use loom::thread;

    /// A waiter never misses the wake-up, whichever side runs first.
    #[test]
    fn loom_join_gate_no_missed_wakeup() {
        loom::model(|| {
            let gate = Arc::new(JoinGate::new());

            let g = gate.clone();
            let waiter = thread::spawn(move || g.wait());

            gate.signal();
            waiter.join().unwrap();

            assert!(gate.is_signaled());
        });
    }

    /// Two racing signals produce exactly one transition.
    #[test]
    fn loom_join_gate_single_transition() {
        loom::model(|| {
            let gate = Arc::new(JoinGate::new());

            let g1 = gate.clone();
            let g2 = gate.clone();
            let t1 = thread::spawn(move || g1.signal());
            let t2 = thread::spawn(move || g2.signal());

            let first = t1.join().unwrap();
            let second = t2.join().unwrap();

            assert!(first ^ second, "exactly one signal must win");
        });
    }

    /// Two waiters both return after one signal.
    #[test]
    fn loom_join_gate_wakes_every_waiter() {
        loom::model(|| {
            let gate = Arc::new(JoinGate::new());

            let g1 = gate.clone();
            let g2 = gate.clone();
            let w1 = thread::spawn(move || g1.wait());
            let w2 = thread::spawn(move || g2.wait());

            gate.signal();

            w1.join().unwrap();
            w2.join().unwrap();
        });
    }
}
