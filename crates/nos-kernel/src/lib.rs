//! Nachos Kernel
//!
//! This crate implements the user/kernel boundary of the simulated machine:
//! - Trap dispatch and the syscall ABI
//! - Process lifecycle (Exec, Fork, Join, Exit)
//! - Console arbitration across process trees
//! - Safe access to user memory
//!
//! The machine underneath (CPU, memory, scheduler, filesystem, console
//! device) is reached through the `nos-hal` traits.

extern crate alloc;

pub mod config;
pub mod console;
pub mod directory;
pub mod error;
pub mod frame;
pub mod process;
pub mod sync;
pub mod syscall;
pub mod system;
pub mod trap;
pub mod types;
pub mod uaccess;

// Re-export HAL types
pub use nos_hal::{Cpu, HalError, TrapDisposition, UserStart, HAL as HalTrait};

// Re-export Axiom types
pub use nos_axiom::{SysEvent, SysEventType, SysLog};

pub use config::{KernelConfig, CONSOLE_INPUT, CONSOLE_OUTPUT};
pub use console::{ConsoleArbiter, ConsoleLease, LeaseId};
pub use directory::{JoinTicket, ProcessDirectory};
pub use error::KernelError;
pub use frame::{advance_pc, SysArgs, TrapFrame};
pub use process::ProcessRecord;
pub use sync::JoinGate;
pub use syscall::{Syscall, SyscallOutcome};
pub use system::{Kernel, KernelMetrics, MetricsSnapshot};
pub use trap::ExceptionKind;
pub use types::{SpaceId, SpawnKind};
pub use uaccess::{UserAccessError, UserPtr};
