//! Syscall definitions and types
//!
//! This module contains:
//! - Syscall opcode constants (ABI)
//! - Syscall enum for type-safe dispatch
//! - Syscall outcome type

use crate::frame::SysArgs;
use crate::uaccess::UserPtr;

// ============================================================================
// Syscall Opcodes
// ============================================================================
// Opcode is passed in r2, arguments in r4..=r7, result returned in r2.

pub const SC_HALT: i32 = 0;
pub const SC_EXIT: i32 = 1;
pub const SC_EXEC: i32 = 2;
pub const SC_JOIN: i32 = 3;
pub const SC_CREATE: i32 = 4;
pub const SC_OPEN: i32 = 5;
pub const SC_READ: i32 = 6;
pub const SC_WRITE: i32 = 7;
pub const SC_CLOSE: i32 = 8;
pub const SC_FORK: i32 = 9;
pub const SC_YIELD: i32 = 10;
pub const SC_REMOVE: i32 = 11;
pub const SC_PREDICT_BURST: i32 = 12;

/// Number of defined opcodes
pub const NUM_SYSCALLS: usize = 13;

/// Decoded syscall request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Syscall {
    /// Stop the machine
    Halt,
    /// Terminate the caller
    Exit { status: i32 },
    /// Start a program in a new address space
    Exec { path: UserPtr },
    /// Wait for a process to exit
    Join { target: i32 },
    /// Create a file
    Create { name: UserPtr },
    /// Open a file
    Open { name: UserPtr },
    /// Read into a user buffer
    Read { buf: UserPtr, len: i32, file: i32 },
    /// Write from a user buffer
    Write { buf: UserPtr, len: i32, file: i32 },
    /// Close a file
    Close { file: i32 },
    /// Run a function in a copy of the caller's space
    Fork { entry: u32 },
    /// Give up the CPU
    Yield,
    /// Remove a file
    Remove { name: UserPtr },
    /// Report the expected next CPU burst
    PredictBurst { burst: i32 },
}

impl Syscall {
    /// Decode an opcode and its argument registers. `None` for unknown opcodes.
    pub fn decode(opcode: i32, args: SysArgs) -> Option<Self> {
        let syscall = match opcode {
            SC_HALT => Syscall::Halt,
            SC_EXIT => Syscall::Exit {
                status: args.arg(0),
            },
            SC_EXEC => Syscall::Exec {
                path: UserPtr::new(args.addr(0)),
            },
            SC_JOIN => Syscall::Join {
                target: args.arg(0),
            },
            SC_CREATE => Syscall::Create {
                name: UserPtr::new(args.addr(0)),
            },
            SC_OPEN => Syscall::Open {
                name: UserPtr::new(args.addr(0)),
            },
            SC_READ => Syscall::Read {
                buf: UserPtr::new(args.addr(0)),
                len: args.arg(1),
                file: args.arg(2),
            },
            SC_WRITE => Syscall::Write {
                buf: UserPtr::new(args.addr(0)),
                len: args.arg(1),
                file: args.arg(2),
            },
            SC_CLOSE => Syscall::Close { file: args.arg(0) },
            SC_FORK => Syscall::Fork {
                entry: args.addr(0),
            },
            SC_YIELD => Syscall::Yield,
            SC_REMOVE => Syscall::Remove {
                name: UserPtr::new(args.addr(0)),
            },
            SC_PREDICT_BURST => Syscall::PredictBurst {
                burst: args.arg(0),
            },
            _ => return None,
        };
        Some(syscall)
    }

    /// The opcode this request was decoded from.
    pub fn opcode(&self) -> i32 {
        match self {
            Syscall::Halt => SC_HALT,
            Syscall::Exit { .. } => SC_EXIT,
            Syscall::Exec { .. } => SC_EXEC,
            Syscall::Join { .. } => SC_JOIN,
            Syscall::Create { .. } => SC_CREATE,
            Syscall::Open { .. } => SC_OPEN,
            Syscall::Read { .. } => SC_READ,
            Syscall::Write { .. } => SC_WRITE,
            Syscall::Close { .. } => SC_CLOSE,
            Syscall::Fork { .. } => SC_FORK,
            Syscall::Yield => SC_YIELD,
            Syscall::Remove { .. } => SC_REMOVE,
            Syscall::PredictBurst { .. } => SC_PREDICT_BURST,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Syscall::Halt => "Halt",
            Syscall::Exit { .. } => "Exit",
            Syscall::Exec { .. } => "Exec",
            Syscall::Join { .. } => "Join",
            Syscall::Create { .. } => "Create",
            Syscall::Open { .. } => "Open",
            Syscall::Read { .. } => "Read",
            Syscall::Write { .. } => "Write",
            Syscall::Close { .. } => "Close",
            Syscall::Fork { .. } => "Fork",
            Syscall::Yield => "Yield",
            Syscall::Remove { .. } => "Remove",
            Syscall::PredictBurst { .. } => "PredictBurst",
        }
    }
}

/// What a syscall handler produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// Write this value to r2 and resume
    Return(i32),
    /// Resume with r2 untouched
    Void,
    /// The caller exited
    Exited,
    /// The machine was halted
    Halted,
}

impl SyscallOutcome {
    /// Value written to r2, if any.
    pub fn result(&self) -> Option<i32> {
        match self {
            SyscallOutcome::Return(v) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_every_opcode() {
        let args = SysArgs([0x80, 5, 1, 0]);
        for opcode in 0..NUM_SYSCALLS as i32 {
            let syscall = Syscall::decode(opcode, args).unwrap();
            assert_eq!(syscall.opcode(), opcode);
        }
    }

    #[test]
    fn test_decode_unknown_opcode() {
        assert_eq!(Syscall::decode(13, SysArgs::default()), None);
        assert_eq!(Syscall::decode(-1, SysArgs::default()), None);
    }

    #[test]
    fn test_decode_read_args() {
        let syscall = Syscall::decode(SC_READ, SysArgs([0x100, 16, 0, 0])).unwrap();
        assert_eq!(
            syscall,
            Syscall::Read {
                buf: UserPtr::new(0x100),
                len: 16,
                file: 0
            }
        );
    }

    #[test]
    fn test_outcome_result() {
        assert_eq!(SyscallOutcome::Return(-1).result(), Some(-1));
        assert_eq!(SyscallOutcome::Void.result(), None);
    }
}
