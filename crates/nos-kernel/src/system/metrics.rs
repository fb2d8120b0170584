//! Kernel counters
//!
//! Per-opcode syscall counts plus process and fault totals. Updated with
//! relaxed atomics from any process thread; read as a [`MetricsSnapshot`].

use core::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::syscall::NUM_SYSCALLS;

/// Live counters owned by the kernel.
pub struct KernelMetrics {
    syscalls: [AtomicU64; NUM_SYSCALLS],
    processes_created: AtomicU64,
    processes_exited: AtomicU64,
    contract_violations: AtomicU64,
}

impl KernelMetrics {
    pub(crate) fn new() -> Self {
        Self {
            syscalls: core::array::from_fn(|_| AtomicU64::new(0)),
            processes_created: AtomicU64::new(0),
            processes_exited: AtomicU64::new(0),
            contract_violations: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_syscall(&self, opcode: i32) {
        if let Some(counter) = usize::try_from(opcode)
            .ok()
            .and_then(|i| self.syscalls.get(i))
        {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_created(&self) {
        self.processes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exited(&self) {
        self.processes_exited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_violation(&self) {
        self.contract_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut syscalls = [0; NUM_SYSCALLS];
        for (out, counter) in syscalls.iter_mut().zip(&self.syscalls) {
            *out = counter.load(Ordering::Relaxed);
        }
        MetricsSnapshot {
            syscalls,
            processes_created: self.processes_created.load(Ordering::Relaxed),
            processes_exited: self.processes_exited.load(Ordering::Relaxed),
            contract_violations: self.contract_violations.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`KernelMetrics`] at one moment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Calls per opcode, indexed by opcode
    pub syscalls: [u64; NUM_SYSCALLS],
    pub processes_created: u64,
    pub processes_exited: u64,
    pub contract_violations: u64,
}

impl MetricsSnapshot {
    /// Calls of one opcode.
    pub fn syscall_count(&self, opcode: i32) -> u64 {
        usize::try_from(opcode)
            .ok()
            .and_then(|i| self.syscalls.get(i).copied())
            .unwrap_or(0)
    }

    /// Calls across all opcodes.
    pub fn total_syscalls(&self) -> u64 {
        self.syscalls.iter().sum()
    }

    /// Processes created but not yet exited.
    pub fn live_processes(&self) -> u64 {
        self.processes_created.saturating_sub(self.processes_exited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::{SC_EXIT, SC_WRITE};

    #[test]
    fn test_counts_by_opcode() {
        let metrics = KernelMetrics::new();
        metrics.record_syscall(SC_WRITE);
        metrics.record_syscall(SC_WRITE);
        metrics.record_syscall(SC_EXIT);
        metrics.record_syscall(99);

        let snap = metrics.snapshot();
        assert_eq!(snap.syscall_count(SC_WRITE), 2);
        assert_eq!(snap.syscall_count(SC_EXIT), 1);
        assert_eq!(snap.syscall_count(99), 0);
        assert_eq!(snap.total_syscalls(), 3);
    }

    #[test]
    fn test_live_processes() {
        let metrics = KernelMetrics::new();
        metrics.record_created();
        metrics.record_created();
        metrics.record_exited();
        assert_eq!(metrics.snapshot().live_processes(), 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = KernelMetrics::new();
        metrics.record_violation();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.contract_violations, 1);
    }
}
