//! Per-process kernel state.

use alloc::string::String;
use alloc::sync::Arc;
use std::sync::{Mutex, OnceLock};

use nos_hal::{AddressTranslator, Cpu, HAL};

use crate::console::ConsoleLease;
use crate::error::KernelError;
use crate::frame::TrapFrame;
use crate::sync::{lock, JoinGate};
use crate::types::{SpaceId, SpawnKind};

/// A process as the kernel sees it.
///
/// Shared as `Arc<ProcessRecord<H>>` between the directory, the process's
/// own thread and any joiners. Everything fixed at creation is a plain
/// field; the mutable parts carry their own synchronization.
pub struct ProcessRecord<H: HAL> {
    space_id: SpaceId,
    name: String,
    kind: SpawnKind,
    space: H::Space,
    console: Option<Arc<ConsoleLease>>,
    exit_status: OnceLock<i32>,
    join_gate: JoinGate,
    predicted_burst: Mutex<Option<i32>>,
    frame: Mutex<TrapFrame>,
}

impl<H: HAL> ProcessRecord<H> {
    /// Build a record. The saved frame starts zeroed with the space's page
    /// table installed.
    pub fn new(
        space_id: SpaceId,
        name: impl Into<String>,
        kind: SpawnKind,
        space: H::Space,
        console: Option<Arc<ConsoleLease>>,
    ) -> Self {
        let mut frame = TrapFrame::new();
        frame.page_table = Some(space.page_table_base());

        Self {
            space_id,
            name: name.into(),
            kind,
            space,
            console,
            exit_status: OnceLock::new(),
            join_gate: JoinGate::new(),
            predicted_burst: Mutex::new(None),
            frame: Mutex::new(frame),
        }
    }

    pub fn space_id(&self) -> SpaceId {
        self.space_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SpawnKind {
        self.kind
    }

    /// Created by the program loader rather than Exec or Fork.
    pub fn is_top_level(&self) -> bool {
        matches!(self.kind, SpawnKind::TopLevel)
    }

    pub fn space(&self) -> &H::Space {
        &self.space
    }

    /// The console lease, shared with the rest of the process tree.
    pub fn console(&self) -> Option<&Arc<ConsoleLease>> {
        self.console.as_ref()
    }

    pub fn join_gate(&self) -> &JoinGate {
        &self.join_gate
    }

    /// Exit status, once the process has exited.
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status.get().copied()
    }

    /// Record the exit status.
    ///
    /// # Returns
    /// * `Err(KernelError::AlreadyExited)` - a status was already recorded
    pub fn set_exit_status(&self, status: i32) -> Result<(), KernelError> {
        self.exit_status
            .set(status)
            .map_err(|_| KernelError::AlreadyExited(self.space_id))
    }

    pub fn predicted_burst(&self) -> Option<i32> {
        *lock(&self.predicted_burst)
    }

    pub fn set_predicted_burst(&self, burst: i32) {
        *lock(&self.predicted_burst) = Some(burst);
    }

    /// Copy of the saved frame.
    pub fn frame(&self) -> TrapFrame {
        lock(&self.frame).clone()
    }

    /// Capture the CPU state into this record.
    pub fn save_frame(&self, cpu: &dyn Cpu) {
        lock(&self.frame).save_from(cpu);
    }

    /// Load this record's saved state into the CPU.
    pub fn restore_frame(&self, cpu: &mut dyn Cpu) {
        lock(&self.frame).restore(cpu);
    }
}

impl<H: HAL> core::fmt::Debug for ProcessRecord<H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessRecord")
            .field("space_id", &self.space_id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("console", &self.console)
            .field("exit_status", &self.exit_status())
            .field("join_gate", &self.join_gate)
            .finish_non_exhaustive()
    }
}
