//! MIPS register numbering and exception causes used by the simulator.

/// Number of general purpose registers
pub const NUM_GP_REGS: usize = 32;

/// Stack pointer
pub const STACK_REG: usize = 29;

/// Return address of a procedure call
pub const RET_ADDR_REG: usize = 31;

/// Multiply result, high word
pub const HI_REG: usize = 32;

/// Multiply result, low word
pub const LO_REG: usize = 33;

/// Current program counter
pub const PC_REG: usize = 34;

/// Next program counter (for branch delay)
pub const NEXT_PC_REG: usize = 35;

/// Previous program counter (for debugging)
pub const PREV_PC_REG: usize = 36;

/// Target register of a delayed load
pub const LOAD_REG: usize = 37;

/// Value of a delayed load
pub const LOAD_VALUE_REG: usize = 38;

/// Failing virtual address on an exception
pub const BAD_VADDR_REG: usize = 39;

/// Size of the user register bank
pub const NUM_TOTAL_REGS: usize = 40;

/// Size of the kernel register bank
pub const NUM_KERNEL_REGS: usize = 8;

/// Width of one instruction in bytes
pub const INSTRUCTION_WIDTH: i32 = 4;

// Exception causes raised by the CPU

/// Everything ok
pub const NO_EXCEPTION: u32 = 0;
/// A program executed a system call
pub const SYSCALL_EXCEPTION: u32 = 1;
/// No valid translation found
pub const PAGE_FAULT_EXCEPTION: u32 = 2;
/// Write attempted to a read-only page
pub const READ_ONLY_EXCEPTION: u32 = 3;
/// Translation resulted in an invalid physical address
pub const BUS_ERROR_EXCEPTION: u32 = 4;
/// Unaligned reference or one past the end of the address space
pub const ADDRESS_ERROR_EXCEPTION: u32 = 5;
/// Integer overflow in add or sub
pub const OVERFLOW_EXCEPTION: u32 = 6;
/// Unimplemented or reserved instruction
pub const ILLEGAL_INSTR_EXCEPTION: u32 = 7;
