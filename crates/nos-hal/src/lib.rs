//! Hardware Abstraction Layer traits for the Nachos kernel
//!
//! The kernel only implements the trap layer and the process lifecycle. Everything
//! underneath it is consumed through the traits in this crate:
//!
//! - **Machine**: the MIPS instruction-set simulator, its register file and
//!   physical memory
//! - **Address spaces**: allocation, fork-copy, release and address translation
//! - **Scheduler**: ready queue, yield, sleep and thread completion
//! - **Filesystem**: open/create/remove/close of named files
//! - **Console**: the single character device shared by user programs
//!
//! # Implementations
//!
//! - **Mock**: `nos-hal-mock`, a std-hosted machine with one host thread per
//!   simulated process (tests and the `nos-sim` tool)

#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use alloc::sync::Arc;

pub mod mips;

/// Collaborator-defined handle for an open file.
pub type OpenFileId = i32;

/// Body of a newly scheduled kernel thread.
pub type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// Callback invoked by the CPU on every user-mode exception.
///
/// Receives the exception cause (see [`mips`]) and the live register file.
pub type TrapHandler<'a> = dyn FnMut(u32, &mut dyn Cpu) -> TrapDisposition + 'a;

/// Hardware Abstraction Layer trait
///
/// # Associated Types
///
/// - `Space`: one user address space. It is owned exclusively by the kernel's
///   process record and translated through [`AddressTranslator`].
pub trait HAL: Send + Sync + 'static {
    /// A user address space
    type Space: AddressTranslator + 'static;

    // === Machine ===

    /// Stop the whole simulated machine.
    ///
    /// Running user code observes the halt at its next trap.
    fn halt(&self);

    /// Whether [`HAL::halt`] has been called.
    fn is_halted(&self) -> bool;

    /// Simulated time in ticks since boot.
    fn now_ticks(&self) -> u64;

    /// Write a diagnostic message to the platform log.
    fn debug_write(&self, msg: &str);

    /// Size of physical memory in bytes.
    fn memory_size(&self) -> usize;

    /// Read one byte of physical memory. `None` past the end of memory.
    fn read_byte(&self, paddr: usize) -> Option<u8>;

    /// Write one byte of physical memory.
    ///
    /// # Returns
    /// * `Err(HalError::InvalidAddress)` - `paddr` is past the end of memory
    fn write_byte(&self, paddr: usize, value: u8) -> Result<(), HalError>;

    // === Address Spaces ===

    /// Create an empty address space for a new process.
    ///
    /// # Returns
    /// * `Err(HalError::OutOfMemory)` - no physical frames left
    fn allocate_space(&self) -> Result<Self::Space, HalError>;

    /// Create a new address space holding a copy of `parent`'s contents.
    ///
    /// Later writes to either space must not be visible in the other.
    fn fork_space(&self, parent: &Self::Space) -> Result<Self::Space, HalError>;

    /// Deallocate the frames backing `space` and zero them.
    ///
    /// After release every translation through `space` fails.
    fn release_space(&self, space: &Self::Space);

    /// Initialize `space` from the executable behind `file`.
    fn load_executable(&self, space: &Self::Space, file: OpenFileId) -> Result<(), HalError>;

    // === CPU ===

    /// Run user code in `space` until `on_trap` returns something other than
    /// [`TrapDisposition::Resume`].
    ///
    /// The CPU initializes the user registers for `start`, installs the space's
    /// translation, and calls `on_trap` on every exception.
    fn run_user(&self, space: &Self::Space, start: UserStart, on_trap: &mut TrapHandler<'_>);

    // === Scheduler ===

    /// Make a new thread ready to run. `body` runs once the thread is dispatched.
    fn ready_to_run(&self, name: &str, body: ThreadBody) -> Result<(), HalError>;

    /// Cooperatively give up the CPU. Returns when the caller is rescheduled.
    fn yield_current(&self);

    /// Put the current thread to sleep for `ticks`.
    fn sleep_current(&self, ticks: u32);

    /// The current thread is finished and will not run again.
    fn finish_current(&self);

    /// A process reported its next CPU burst; recompute scheduling hints.
    fn update_burst_prediction(&self, _space_id: u32, _predicted: i32) {
        // Default: scheduler ignores hints
    }

    // === Filesystem ===

    /// Open a named file.
    fn open(&self, name: &str) -> Option<OpenFileId>;

    /// Create a named file. The stub filesystem always succeeds.
    fn create(&self, _name: &str) -> bool {
        true
    }

    /// Remove a named file. The stub filesystem always succeeds.
    fn remove(&self, _name: &str) -> bool {
        true
    }

    /// Close an open file.
    fn close(&self, _file: OpenFileId) {}

    // === Console ===

    /// The console device. There is one per machine.
    fn console(&self) -> Arc<dyn ConsoleDevice>;
}

/// Virtual-to-physical translation for one address space.
pub trait AddressTranslator: Send + Sync {
    /// Translate a user virtual address to an index into physical memory.
    ///
    /// Returns `None` when `vaddr` is not mapped in this space.
    fn translate(&self, vaddr: u32) -> Option<usize>;

    /// Size of the virtual address space in bytes.
    fn size(&self) -> usize;

    /// Value loaded into the CPU's page-table register while this space runs.
    fn page_table_base(&self) -> u32;
}

/// The CPU register file as seen from the trap handler.
///
/// A thread running user code has two register sets: the user bank, indexed
/// by [`mips`] register numbers, and a small kernel bank.
pub trait Cpu {
    /// Read a user-mode register.
    fn read_register(&self, reg: usize) -> i32;

    /// Write a user-mode register.
    fn write_register(&mut self, reg: usize, value: i32);

    /// Read a kernel-mode register.
    fn read_kernel_register(&self, reg: usize) -> i32;

    /// Write a kernel-mode register.
    fn write_kernel_register(&mut self, reg: usize, value: i32);

    /// Currently installed page table, if any.
    fn page_table(&self) -> Option<u32>;

    /// Install a page table (or none).
    fn set_page_table(&mut self, base: Option<u32>);
}

/// The single shared character device.
pub trait ConsoleDevice: Send + Sync {
    /// Block until a byte of input is available and return it.
    ///
    /// Returns `None` once the device has been shut down.
    fn get_char(&self) -> Option<u8>;

    /// Emit one byte of output.
    fn put_char(&self, byte: u8);

    /// Stop the device. Readers blocked in `get_char` return `None`.
    fn shutdown(&self);
}

/// Where user execution begins in a freshly scheduled thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserStart {
    /// The entry point of the executable loaded into the space
    Program,
    /// A function inside an already populated space (Fork)
    Function(u32),
}

/// What the CPU does after a trap has been handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapDisposition {
    /// Continue executing user code
    Resume,
    /// The process exited; its thread stops
    Exited,
    /// The machine was halted
    Halted,
}

/// HAL errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalError {
    /// Not enough memory available
    OutOfMemory,
    /// Physical or virtual address out of range
    InvalidAddress,
    /// File not found or not executable
    BadExecutable,
    /// Failed to schedule a thread
    SpawnFailed,
    /// Operation not supported on this platform
    NotSupported,
    /// I/O error
    IoError,
}

impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            HalError::OutOfMemory => "out of memory",
            HalError::InvalidAddress => "invalid address",
            HalError::BadExecutable => "bad executable",
            HalError::SpawnFailed => "thread spawn failed",
            HalError::NotSupported => "not supported",
            HalError::IoError => "i/o error",
        };
        f.write_str(msg)
    }
}
