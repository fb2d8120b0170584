//! Trap dispatch
//!
//! Entry point for every user-mode exception. Syscall traps are decoded from
//! the register file, dispatched to their handler, answered in r2 and
//! stepped past. Anything else is a fatal contract violation that halts the
//! machine.
//!
//! All syscalls flow: `CPU trap → handle_exception → SysLog (request) →
//! handler → r2 + PC advance → SysLog (response) → CPU`

use alloc::format;
use alloc::sync::Arc;

use nos_hal::mips;
use nos_hal::{Cpu, TrapDisposition, HAL};

use crate::error::KernelError;
use crate::frame::{advance_pc, SysArgs, TrapFrame, RESULT_REG};
use crate::process::ProcessRecord;
use crate::syscall::{Syscall, SyscallOutcome};
use crate::system::Kernel;

/// Exception causes raised by the CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionKind {
    NoException,
    Syscall,
    PageFault,
    ReadOnly,
    BusError,
    AddressError,
    Overflow,
    IllegalInstruction,
    Unknown(u32),
}

impl ExceptionKind {
    pub fn from_cause(cause: u32) -> Self {
        match cause {
            mips::NO_EXCEPTION => ExceptionKind::NoException,
            mips::SYSCALL_EXCEPTION => ExceptionKind::Syscall,
            mips::PAGE_FAULT_EXCEPTION => ExceptionKind::PageFault,
            mips::READ_ONLY_EXCEPTION => ExceptionKind::ReadOnly,
            mips::BUS_ERROR_EXCEPTION => ExceptionKind::BusError,
            mips::ADDRESS_ERROR_EXCEPTION => ExceptionKind::AddressError,
            mips::OVERFLOW_EXCEPTION => ExceptionKind::Overflow,
            mips::ILLEGAL_INSTR_EXCEPTION => ExceptionKind::IllegalInstruction,
            other => ExceptionKind::Unknown(other),
        }
    }
}

impl<H: HAL> Kernel<H> {
    /// Handle one exception raised while `process` was running.
    ///
    /// On a syscall trap the result (if any) is written to r2 and the PC
    /// triple is advanced by one instruction, whatever the handler returned.
    ///
    /// # Returns
    /// * `Ok(Resume)` - continue user code
    /// * `Ok(Exited)` - `process` is gone
    /// * `Ok(Halted)` - the machine stopped
    /// * `Err(ContractViolation)` - unknown cause or opcode; the machine has been halted
    pub fn handle_exception(
        self: &Arc<Self>,
        process: &Arc<ProcessRecord<H>>,
        cause: u32,
        cpu: &mut dyn Cpu,
    ) -> Result<TrapDisposition, KernelError> {
        let opcode = cpu.read_register(RESULT_REG);

        let kind = ExceptionKind::from_cause(cause);
        if kind != ExceptionKind::Syscall {
            let what = format!("{:?}", kind);
            return Err(self.contract_violation(process, cpu, cause, opcode, &what));
        }

        let args = SysArgs::from_cpu(cpu);
        let Some(syscall) = Syscall::decode(opcode, args) else {
            return Err(self.contract_violation(process, cpu, cause, opcode, "unknown syscall"));
        };

        self.metrics_ref().record_syscall(opcode);
        let sender = process.space_id().0;
        let request_id =
            self.syslog()
                .log_request(sender, opcode as u32, args.0, self.hal().now_ticks());

        let result = self.dispatch(process, syscall, cpu);

        if let Ok(SyscallOutcome::Return(value)) = result {
            cpu.write_register(RESULT_REG, value);
        }
        advance_pc(cpu, self.config().instruction_width);

        let response = result.as_ref().ok().and_then(SyscallOutcome::result);
        self.syslog()
            .log_response(sender, request_id, response, self.hal().now_ticks());

        match result {
            Ok(SyscallOutcome::Exited) => Ok(TrapDisposition::Exited),
            Ok(SyscallOutcome::Halted) => Ok(TrapDisposition::Halted),
            Ok(_) if self.hal().is_halted() => Ok(TrapDisposition::Halted),
            Ok(_) => Ok(TrapDisposition::Resume),
            Err(e) => {
                self.log(&format!(
                    "{} failed for process {}: {}",
                    syscall.name(),
                    process.space_id(),
                    e
                ));
                self.metrics_ref().record_violation();
                self.stop_machine();
                Err(e)
            }
        }
    }

    fn dispatch(
        self: &Arc<Self>,
        process: &Arc<ProcessRecord<H>>,
        syscall: Syscall,
        cpu: &mut dyn Cpu,
    ) -> Result<SyscallOutcome, KernelError> {
        let outcome = match syscall {
            Syscall::Halt => self.halt(process),
            Syscall::Exit { status } => return self.exit(process, status),
            Syscall::Exec { path } => self.exec(process, path),
            Syscall::Join { target } => self.join(process, target, cpu),
            Syscall::Create { name } => self.create(process, name),
            Syscall::Open { name } => self.open(process, name),
            Syscall::Read { buf, len, file } => self.read(process, buf, len, file, cpu),
            Syscall::Write { buf, len, file } => self.write(process, buf, len, file),
            Syscall::Close { file } => self.close(file),
            Syscall::Fork { entry } => self.fork(process, entry),
            Syscall::Yield => self.yield_cpu(process, cpu),
            Syscall::Remove { name } => self.remove(process, name),
            Syscall::PredictBurst { burst } => self.predict_burst(process, burst),
        };
        Ok(outcome)
    }

    fn contract_violation(
        &self,
        process: &ProcessRecord<H>,
        cpu: &dyn Cpu,
        cause: u32,
        opcode: i32,
        what: &str,
    ) -> KernelError {
        self.log(&format!(
            "unexpected user mode exception {}, {} ({}) in process {}",
            cause,
            opcode,
            what,
            process.space_id()
        ));
        self.log(&format!("frame: {}", TrapFrame::save(cpu).dump()));
        self.metrics_ref().record_violation();
        self.stop_machine();
        KernelError::ContractViolation { cause, opcode }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exception_kind_from_cause() {
        assert_eq!(ExceptionKind::from_cause(1), ExceptionKind::Syscall);
        assert_eq!(ExceptionKind::from_cause(2), ExceptionKind::PageFault);
        assert_eq!(ExceptionKind::from_cause(7), ExceptionKind::IllegalInstruction);
        assert_eq!(ExceptionKind::from_cause(42), ExceptionKind::Unknown(42));
    }
}
