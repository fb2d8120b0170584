//! The kernel context.
//!
//! [`Kernel`] is built once at boot and shared as `Arc<Kernel<H>>` between
//! every process thread. It owns the directory, the console arbiter, the
//! audit log and the counters; the machine itself is reached through `H`.
//!
//! ```text
//! ┌──────────────────────── Kernel<H> ────────────────────────┐
//! │                                                            │
//! │  trap ──► handle_exception ──► lifecycle / io handlers     │
//! │                │                     │                     │
//! │                ▼                     ▼                     │
//! │             SysLog         ProcessDirectory  ConsoleArbiter│
//! │                                                            │
//! └──────────────────────────────┬─────────────────────────────┘
//!                                │
//!                                ▼
//!                         HAL (machine, scheduler, fs, console)
//! ```

mod io;
mod lifecycle;
mod metrics;

pub use metrics::{KernelMetrics, MetricsSnapshot};

use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::sync::{Mutex, MutexGuard};

use nos_axiom::{SysEvent, SysLog};
use nos_hal::{Cpu, HAL};

use crate::config::KernelConfig;
use crate::console::ConsoleArbiter;
use crate::directory::ProcessDirectory;
use crate::process::ProcessRecord;
use crate::sync::lock;
use crate::types::SpaceId;

/// Kernel context shared by every process thread.
pub struct Kernel<H: HAL> {
    hal: Arc<H>,
    config: KernelConfig,
    directory: ProcessDirectory<H>,
    console: ConsoleArbiter,
    syslog: Mutex<SysLog>,
    metrics: KernelMetrics,
}

impl<H: HAL> Kernel<H> {
    /// Boot a kernel on `hal` with the default configuration.
    pub fn boot(hal: Arc<H>) -> Arc<Self> {
        Self::boot_with_config(hal, KernelConfig::default())
    }

    /// Boot a kernel on `hal` with `config`.
    pub fn boot_with_config(hal: Arc<H>, config: KernelConfig) -> Arc<Self> {
        let console = ConsoleArbiter::new(hal.console(), config.console_lease_limit);
        let kernel = Self {
            syslog: Mutex::new(SysLog::with_capacity(config.syslog_capacity)),
            directory: ProcessDirectory::new(),
            metrics: KernelMetrics::new(),
            console,
            config,
            hal,
        };
        kernel.log(&format!(
            "boot: {} bytes of memory, console lease limit {:?}",
            kernel.hal.memory_size(),
            kernel.config.console_lease_limit
        ));
        Arc::new(kernel)
    }

    /// Get reference to HAL.
    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn directory(&self) -> &ProcessDirectory<H> {
        &self.directory
    }

    pub fn console(&self) -> &ConsoleArbiter {
        &self.console
    }

    /// Look up a live process.
    pub fn process(&self, id: SpaceId) -> Option<Arc<ProcessRecord<H>>> {
        self.directory.get(id)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Lock the audit log.
    pub fn syslog(&self) -> MutexGuard<'_, SysLog> {
        lock(&self.syslog)
    }

    /// Copy of every retained audit event.
    pub fn syslog_events(&self) -> Vec<SysEvent> {
        self.syslog().snapshot()
    }

    /// Two-phase switch: save `outgoing` (if any), then load `incoming`.
    pub fn context_switch(
        &self,
        cpu: &mut dyn Cpu,
        outgoing: Option<&ProcessRecord<H>>,
        incoming: &ProcessRecord<H>,
    ) {
        if let Some(out) = outgoing {
            out.save_frame(cpu);
        }
        incoming.restore_frame(cpu);
    }

    // ========================================================================
    // Logging
    // ========================================================================

    pub(crate) fn log(&self, msg: &str) {
        self.hal.debug_write(&format!("[kernel] {}", msg));
    }

    pub(crate) fn metrics_ref(&self) -> &KernelMetrics {
        &self.metrics
    }
}
