//! Kernel error types.

use core::fmt;

use nos_hal::HalError;

use crate::types::SpaceId;
use crate::uaccess::UserAccessError;

/// Kernel errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// Unknown exception cause or syscall opcode; the machine has been halted
    ContractViolation {
        /// Exception cause raised by the CPU
        cause: u32,
        /// Value of the opcode register at the time of the trap
        opcode: i32,
    },
    /// Exit status was already recorded for this process
    AlreadyExited(SpaceId),
    /// Console lease was already released
    LeaseAlreadyReleased(u64),
    /// Bad user pointer or buffer
    UserAccess(UserAccessError),
    /// HAL error
    Hal(HalError),
}

impl From<HalError> for KernelError {
    fn from(e: HalError) -> Self {
        KernelError::Hal(e)
    }
}

impl From<UserAccessError> for KernelError {
    fn from(e: UserAccessError) -> Self {
        KernelError::UserAccess(e)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::ContractViolation { cause, opcode } => {
                write!(f, "unexpected user mode exception {}, {}", cause, opcode)
            }
            KernelError::AlreadyExited(id) => write!(f, "space {} already exited", id),
            KernelError::LeaseAlreadyReleased(lease) => {
                write!(f, "console lease {} already released", lease)
            }
            KernelError::UserAccess(e) => write!(f, "user access: {}", e),
            KernelError::Hal(e) => write!(f, "hal: {}", e),
        }
    }
}

impl std::error::Error for KernelError {}
