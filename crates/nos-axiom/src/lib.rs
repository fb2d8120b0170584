//! Axiom audit layer for the Nachos kernel
//!
//! Every trap that reaches the syscall layer is recorded twice: once when the
//! request is decoded and once when the handler produces its result. The log
//! is append-only with monotonic event ids and a bounded in-memory window.

#![no_std]
extern crate alloc;

pub mod syslog;

pub use syslog::{SysEvent, SysEventType, SysLog, DEFAULT_SYSLOG_CAPACITY};

/// Monotonic audit event identifier
pub type EventId = u64;

/// Space id of the process that trapped
pub type SenderId = u32;
