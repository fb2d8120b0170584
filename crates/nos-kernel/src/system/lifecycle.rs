//! Process lifecycle
//!
//! This module contains the handlers that create, synchronize and retire
//! processes:
//! - `spawn_top_level()` - program loader entry point
//! - `exec()` / `fork()` - create a descendant sharing the caller's console
//! - `join()` - block until another process exits
//! - `exit()` - release everything the caller owns and stop its thread
//! - `yield_cpu()` / `sleep()` / `predict_burst()` / `halt()`

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;

use nos_hal::{Cpu, HalError, ThreadBody, TrapDisposition, UserStart, HAL};

use super::Kernel;
use crate::console::ConsoleLease;
use crate::directory::JoinTicket;
use crate::error::KernelError;
use crate::process::ProcessRecord;
use crate::syscall::SyscallOutcome;
use crate::types::{SpaceId, SpawnKind};
use crate::uaccess::{read_cstr, UserPtr};

impl<H: HAL> Kernel<H> {
    // ========================================================================
    // Creation
    // ========================================================================

    /// Load `program` as a new top-level process with its own console lease.
    ///
    /// The executable is opened and loaded when the process first runs; if
    /// that fails the process exits with status -1.
    pub fn spawn_top_level(self: &Arc<Self>, program: &str) -> Result<SpaceId, KernelError> {
        let space = self.hal.allocate_space()?;
        let id = self.directory.reserve_id();
        let console = self.allocate_console(id);

        let record = Arc::new(ProcessRecord::new(
            id,
            program,
            SpawnKind::TopLevel,
            space,
            console,
        ));
        self.register(&record);
        self.log(&format!("loaded top-level process {} ({})", id, program));

        if let Err(e) =
            self.start_process(Arc::clone(&record), UserStart::Program, Some(String::from(program)))
        {
            self.abandon(&record);
            return Err(e);
        }
        Ok(id)
    }

    /// Exec: start the program named at `path` in a new address space.
    ///
    /// Returns the child's space id, or -1 if the path cannot be read or no
    /// space is available. Nothing is registered on failure.
    pub(crate) fn exec(self: &Arc<Self>, caller: &ProcessRecord<H>, path: UserPtr) -> SyscallOutcome {
        let program = match read_cstr(&*self.hal, caller.space(), path, self.config.max_path_len) {
            Ok(p) => p,
            Err(e) => {
                self.log(&format!("exec from {}: bad path: {}", caller.space_id(), e));
                return SyscallOutcome::Return(-1);
            }
        };

        let space = match self.hal.allocate_space() {
            Ok(s) => s,
            Err(e) => {
                self.log(&format!("exec {} from {}: {}", program, caller.space_id(), e));
                return SyscallOutcome::Return(-1);
            }
        };

        let id = self.directory.reserve_id();
        let record = Arc::new(ProcessRecord::new(
            id,
            program.clone(),
            SpawnKind::Execed(caller.space_id()),
            space,
            caller.console().cloned(),
        ));
        self.register(&record);
        self.log(&format!(
            "exec {} as process {} (parent {})",
            program,
            id,
            caller.space_id()
        ));

        match self.start_process(Arc::clone(&record), UserStart::Program, Some(program)) {
            Ok(()) => SyscallOutcome::Return(id.as_register()),
            Err(e) => {
                self.log(&format!("exec: could not schedule process {}: {}", id, e));
                self.abandon(&record);
                SyscallOutcome::Return(-1)
            }
        }
    }

    /// Fork: run the function at `entry` in a copy of the caller's space.
    pub(crate) fn fork(self: &Arc<Self>, caller: &ProcessRecord<H>, entry: u32) -> SyscallOutcome {
        let space = match self.hal.fork_space(caller.space()) {
            Ok(s) => s,
            Err(e) => {
                self.log(&format!("fork from {}: {}", caller.space_id(), e));
                return SyscallOutcome::Void;
            }
        };

        let id = self.directory.reserve_id();
        let record = Arc::new(ProcessRecord::new(
            id,
            format!("{} (fork)", caller.name()),
            SpawnKind::Forked(caller.space_id()),
            space,
            caller.console().cloned(),
        ));
        self.register(&record);
        self.log(&format!(
            "fork {} from {} at {:#x}",
            id,
            caller.space_id(),
            entry
        ));

        if let Err(e) = self.start_process(Arc::clone(&record), UserStart::Function(entry), None) {
            self.log(&format!("fork: could not schedule process {}: {}", id, e));
            self.abandon(&record);
        }
        SyscallOutcome::Void
    }

    fn register(&self, record: &Arc<ProcessRecord<H>>) {
        self.directory.register(Arc::clone(record));
        self.metrics.record_created();
    }

    fn allocate_console(&self, holder: SpaceId) -> Option<Arc<ConsoleLease>> {
        match self.console.allocate(holder) {
            Some(lease) => {
                self.log(&format!("console lease {} granted to {}", lease.id(), holder));
                Some(lease)
            }
            None => {
                self.log(&format!(
                    "console lease limit reached, process {} runs without console",
                    holder
                ));
                None
            }
        }
    }

    // ========================================================================
    // Running
    // ========================================================================

    fn start_process(
        self: &Arc<Self>,
        record: Arc<ProcessRecord<H>>,
        start: UserStart,
        program: Option<String>,
    ) -> Result<(), KernelError> {
        let kernel = Arc::clone(self);
        let name = format!("{}:{}", record.name(), record.space_id());
        let body: ThreadBody = Box::new(move || kernel.run_process(record, start, program));
        self.hal.ready_to_run(&name, body)?;
        Ok(())
    }

    /// Thread body of every process.
    fn run_process(
        self: &Arc<Self>,
        record: Arc<ProcessRecord<H>>,
        start: UserStart,
        program: Option<String>,
    ) {
        if let Some(program) = program {
            if let Err(e) = self.load(&record, &program) {
                self.log(&format!(
                    "process {}: cannot load {}: {}",
                    record.space_id(),
                    program,
                    e
                ));
                self.terminate(&record, -1);
                return;
            }
        }

        self.hal.run_user(record.space(), start, &mut |cause: u32, cpu: &mut dyn Cpu| {
            match self.handle_exception(&record, cause, cpu) {
                Ok(disposition) => disposition,
                Err(_) => TrapDisposition::Halted,
            }
        });

        if record.exit_status().is_none() && !self.hal.is_halted() {
            self.log(&format!(
                "process {} returned without Exit",
                record.space_id()
            ));
            self.terminate(&record, 0);
        }
    }

    fn load(&self, record: &ProcessRecord<H>, program: &str) -> Result<(), KernelError> {
        let file = self
            .hal
            .open(program)
            .ok_or(KernelError::Hal(HalError::BadExecutable))?;
        let loaded = self.hal.load_executable(record.space(), file);
        self.hal.close(file);
        loaded?;
        Ok(())
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    /// Join: block until `target` exits.
    ///
    /// Returns 0 once the target has exited (immediately if it already
    /// had), -1 for an id that never existed or the caller's own id.
    pub(crate) fn join(
        &self,
        caller: &ProcessRecord<H>,
        target: i32,
        cpu: &mut dyn Cpu,
    ) -> SyscallOutcome {
        let me = caller.space_id();
        let target = match SpaceId::from_register(target) {
            Some(t) if t != me => t,
            _ => return SyscallOutcome::Return(-1),
        };

        match self.directory.add_join_waiter(me, target) {
            JoinTicket::Pending(record) => {
                self.log(&format!("process {} joining {}", me, target));
                caller.save_frame(cpu);
                if !self.hal.is_halted() {
                    record.join_gate().wait();
                }
                caller.restore_frame(cpu);
                self.directory.remove_join_waiter(me, target);
                if self.hal.is_halted() {
                    self.log(&format!("process {} join on {} ended by halt", me, target));
                    return SyscallOutcome::Halted;
                }
                self.log(&format!(
                    "process {} joined {} (status {:?})",
                    me,
                    target,
                    record.exit_status()
                ));
                SyscallOutcome::Return(0)
            }
            JoinTicket::AlreadyExited(_) => SyscallOutcome::Return(0),
            JoinTicket::Unknown => {
                self.log(&format!("process {} joining unknown id {}", me, target));
                SyscallOutcome::Return(-1)
            }
        }
    }

    // ========================================================================
    // Termination
    // ========================================================================

    /// Exit: retire the caller and finish its thread.
    pub(crate) fn exit(
        &self,
        caller: &ProcessRecord<H>,
        status: i32,
    ) -> Result<SyscallOutcome, KernelError> {
        self.retire(caller, status)?;
        self.hal.finish_current();
        Ok(SyscallOutcome::Exited)
    }

    /// Exit on behalf of a process that never reached user code.
    fn terminate(&self, record: &ProcessRecord<H>, status: i32) {
        if let Err(e) = self.exit(record, status) {
            self.log(&format!("process {}: {}", record.space_id(), e));
        }
    }

    /// Undo a creation whose thread could not be scheduled.
    fn abandon(&self, record: &ProcessRecord<H>) {
        if let Err(e) = self.retire(record, -1) {
            self.log(&format!("process {}: {}", record.space_id(), e));
        }
    }

    /// Release everything `record` owns and wake its joiners.
    fn retire(&self, record: &ProcessRecord<H>, status: i32) -> Result<(), KernelError> {
        record.set_exit_status(status)?;
        let id = record.space_id();
        self.log(&format!("process {} exited with status {}", id, status));

        if record.is_top_level() {
            if let Some(lease) = record.console() {
                match self.console.free(lease) {
                    Ok(()) => self.log(&format!("console lease {} freed by {}", lease.id(), id)),
                    Err(e) => self.log(&format!("process {}: {}", id, e)),
                }
            }
        }

        self.hal.release_space(record.space());
        record.join_gate().signal();

        let woken = self.directory.on_exit(record, status);
        if !woken.is_empty() {
            self.log(&format!("process {} woke joiners {:?}", id, woken));
        }
        self.metrics.record_exited();
        Ok(())
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Yield: let another ready process run.
    pub(crate) fn yield_cpu(&self, caller: &ProcessRecord<H>, cpu: &mut dyn Cpu) -> SyscallOutcome {
        caller.save_frame(cpu);
        self.hal.yield_current();
        caller.restore_frame(cpu);
        SyscallOutcome::Void
    }

    /// Put `process` to sleep for `ticks`, preserving its CPU state.
    pub fn sleep(&self, process: &ProcessRecord<H>, ticks: u32, cpu: &mut dyn Cpu) {
        process.save_frame(cpu);
        self.hal.sleep_current(ticks);
        process.restore_frame(cpu);
    }

    /// PredictBurst: store the hint and pass it to the scheduler.
    pub(crate) fn predict_burst(&self, caller: &ProcessRecord<H>, burst: i32) -> SyscallOutcome {
        caller.set_predicted_burst(burst);
        self.hal.update_burst_prediction(caller.space_id().0, burst);
        SyscallOutcome::Void
    }

    /// Halt: stop the machine.
    pub(crate) fn halt(&self, caller: &ProcessRecord<H>) -> SyscallOutcome {
        self.log(&format!(
            "shutdown, initiated by user program {}",
            caller.space_id()
        ));
        self.stop_machine();
        SyscallOutcome::Halted
    }

    /// Halt the machine and release every thread blocked inside the kernel.
    ///
    /// The halt flag is raised before any gate is opened, so a joiner that
    /// wakes (or arrives later) always observes it.
    pub(crate) fn stop_machine(&self) {
        self.hal.halt();
        self.console.shutdown();
        let blocked = self
            .directory
            .live()
            .iter()
            .filter(|record| record.join_gate().signal())
            .count();
        self.log(&format!("machine stopped, {} join gates opened", blocked));
    }
}
