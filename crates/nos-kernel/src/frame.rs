//! Register marshalling at the user/kernel boundary.
//!
//! A [`TrapFrame`] is the full CPU state of a switched-out process: both
//! register banks plus the installed page table. It is captured before the
//! process blocks and restored verbatim when it runs again.

use alloc::format;
use alloc::string::String;

use nos_hal::mips::{
    NEXT_PC_REG, NUM_KERNEL_REGS, NUM_TOTAL_REGS, PC_REG, PREV_PC_REG,
};
use nos_hal::Cpu;

/// Register holding the syscall opcode on entry and the result on return
pub const RESULT_REG: usize = 2;

/// First of the four argument registers
pub const FIRST_ARG_REG: usize = 4;

/// Saved CPU state of one process
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrapFrame {
    /// User-mode register bank
    pub user: [i32; NUM_TOTAL_REGS],
    /// Kernel-mode register bank
    pub kernel: [i32; NUM_KERNEL_REGS],
    /// Page table installed while this process runs
    pub page_table: Option<u32>,
}

impl TrapFrame {
    /// An all-zero frame with no page table.
    pub fn new() -> Self {
        Self {
            user: [0; NUM_TOTAL_REGS],
            kernel: [0; NUM_KERNEL_REGS],
            page_table: None,
        }
    }

    /// Capture the current CPU state.
    pub fn save(cpu: &dyn Cpu) -> Self {
        let mut frame = Self::new();
        frame.save_from(cpu);
        frame
    }

    /// Overwrite this frame with the current CPU state.
    pub fn save_from(&mut self, cpu: &dyn Cpu) {
        for (reg, slot) in self.user.iter_mut().enumerate() {
            *slot = cpu.read_register(reg);
        }
        for (reg, slot) in self.kernel.iter_mut().enumerate() {
            *slot = cpu.read_kernel_register(reg);
        }
        self.page_table = cpu.page_table();
    }

    /// Load this frame back into the CPU.
    pub fn restore(&self, cpu: &mut dyn Cpu) {
        for (reg, value) in self.user.iter().enumerate() {
            cpu.write_register(reg, *value);
        }
        for (reg, value) in self.kernel.iter().enumerate() {
            cpu.write_kernel_register(reg, *value);
        }
        cpu.set_page_table(self.page_table);
    }

    /// Saved program counter.
    pub fn pc(&self) -> i32 {
        self.user[PC_REG]
    }

    /// Saved next program counter.
    pub fn next_pc(&self) -> i32 {
        self.user[NEXT_PC_REG]
    }

    /// Saved previous program counter.
    pub fn prev_pc(&self) -> i32 {
        self.user[PREV_PC_REG]
    }

    /// One-line summary for the kernel log.
    pub fn dump(&self) -> String {
        format!(
            "pc={:#x} next={:#x} prev={:#x} r2={} sp={:#x} pt={:?}",
            self.pc(),
            self.next_pc(),
            self.prev_pc(),
            self.user[RESULT_REG],
            self.user[nos_hal::mips::STACK_REG],
            self.page_table,
        )
    }
}

impl Default for TrapFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Step the PC triple past the trapping instruction.
///
/// `prev = pc; pc = next; next += width`. Called after every syscall so the
/// user program does not re-execute the trap.
pub fn advance_pc(cpu: &mut dyn Cpu, width: i32) {
    let pc = cpu.read_register(PC_REG);
    let next = cpu.read_register(NEXT_PC_REG);
    cpu.write_register(PREV_PC_REG, pc);
    cpu.write_register(PC_REG, next);
    cpu.write_register(NEXT_PC_REG, next.wrapping_add(width));
}

/// The four syscall argument registers (r4..=r7).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SysArgs(pub [i32; 4]);

impl SysArgs {
    /// Read r4..=r7.
    pub fn from_cpu(cpu: &dyn Cpu) -> Self {
        let mut args = [0; 4];
        for (i, arg) in args.iter_mut().enumerate() {
            *arg = cpu.read_register(FIRST_ARG_REG + i);
        }
        Self(args)
    }

    /// Argument `n` as a signed register value.
    pub fn arg(&self, n: usize) -> i32 {
        self.0[n]
    }

    /// Argument `n` as a user virtual address.
    pub fn addr(&self, n: usize) -> u32 {
        self.0[n] as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestCpu {
        user: [i32; NUM_TOTAL_REGS],
        kernel: [i32; NUM_KERNEL_REGS],
        page_table: Option<u32>,
    }

    impl TestCpu {
        fn new() -> Self {
            Self {
                user: [0; NUM_TOTAL_REGS],
                kernel: [0; NUM_KERNEL_REGS],
                page_table: None,
            }
        }
    }

    impl Cpu for TestCpu {
        fn read_register(&self, reg: usize) -> i32 {
            self.user[reg]
        }
        fn write_register(&mut self, reg: usize, value: i32) {
            self.user[reg] = value;
        }
        fn read_kernel_register(&self, reg: usize) -> i32 {
            self.kernel[reg]
        }
        fn write_kernel_register(&mut self, reg: usize, value: i32) {
            self.kernel[reg] = value;
        }
        fn page_table(&self) -> Option<u32> {
            self.page_table
        }
        fn set_page_table(&mut self, base: Option<u32>) {
            self.page_table = base;
        }
    }

    #[test]
    fn test_advance_pc() {
        let mut cpu = TestCpu::new();
        cpu.user[PREV_PC_REG] = 0x0c;
        cpu.user[PC_REG] = 0x10;
        cpu.user[NEXT_PC_REG] = 0x14;

        advance_pc(&mut cpu, 4);

        assert_eq!(cpu.user[PREV_PC_REG], 0x10);
        assert_eq!(cpu.user[PC_REG], 0x14);
        assert_eq!(cpu.user[NEXT_PC_REG], 0x18);
    }

    #[test]
    fn test_save_restore_roundtrip() {
        let mut cpu = TestCpu::new();
        for (i, r) in cpu.user.iter_mut().enumerate() {
            *r = i as i32 * 3 - 7;
        }
        cpu.kernel[5] = 99;
        cpu.page_table = Some(0x2000);

        let frame = TrapFrame::save(&cpu);

        let mut other = TestCpu::new();
        frame.restore(&mut other);
        assert_eq!(other.user, cpu.user);
        assert_eq!(other.kernel, cpu.kernel);
        assert_eq!(other.page_table, Some(0x2000));
    }

    #[test]
    fn test_sys_args() {
        let mut cpu = TestCpu::new();
        cpu.user[4] = 64;
        cpu.user[5] = 10;
        cpu.user[6] = 1;
        cpu.user[7] = -3;

        let args = SysArgs::from_cpu(&cpu);
        assert_eq!(args, SysArgs([64, 10, 1, -3]));
        assert_eq!(args.addr(0), 64);
        assert_eq!(args.arg(3), -3);
    }

    #[test]
    fn test_dump_mentions_pc() {
        let mut frame = TrapFrame::new();
        frame.user[PC_REG] = 0x40;
        assert!(frame.dump().contains("pc=0x40"));
    }
}
