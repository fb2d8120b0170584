//! Register file and the user-program side of a trap.

use nos_hal::mips::{
    NEXT_PC_REG, NUM_KERNEL_REGS, NUM_TOTAL_REGS, PC_REG, PREV_PC_REG, STACK_REG,
    SYSCALL_EXCEPTION,
};
use nos_hal::{AddressTranslator, Cpu, TrapDisposition, TrapHandler, UserStart, HAL};

use crate::space::MockSpace;
use crate::MockHal;

/// Simulated ticks charged for each trap
pub const SYSCALL_TICKS: u64 = 10;

/// Plain register file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockCpu {
    pub user: [i32; NUM_TOTAL_REGS],
    pub kernel: [i32; NUM_KERNEL_REGS],
    pub page_table: Option<u32>,
}

impl MockCpu {
    pub fn new() -> Self {
        Self {
            user: [0; NUM_TOTAL_REGS],
            kernel: [0; NUM_KERNEL_REGS],
            page_table: None,
        }
    }

    /// Registers as the loader leaves them for `start` in `space`.
    pub fn for_start(space: &MockSpace, start: UserStart) -> Self {
        let mut cpu = Self::new();
        let pc = match start {
            UserStart::Program => 0,
            UserStart::Function(entry) => entry as i32,
        };
        cpu.user[PC_REG] = pc;
        cpu.user[NEXT_PC_REG] = pc + 4;
        cpu.user[PREV_PC_REG] = pc;
        cpu.user[STACK_REG] = space.size() as i32 - 16;
        cpu.page_table = Some(space.page_table_base());
        cpu
    }
}

impl Default for MockCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for MockCpu {
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

/// What a mock user program sees while it runs.
///
/// Programs are plain Rust closures; they issue syscalls through
/// [`UserContext::syscall`] and touch their own memory through the
/// space's translation.
pub struct UserContext<'a, 'b> {
    hal: &'a MockHal,
    space: &'a MockSpace,
    cpu: MockCpu,
    on_trap: &'a mut TrapHandler<'b>,
    start: UserStart,
    stopped: Option<TrapDisposition>,
}

impl<'a, 'b> UserContext<'a, 'b> {
    pub(crate) fn new(
        hal: &'a MockHal,
        space: &'a MockSpace,
        start: UserStart,
        on_trap: &'a mut TrapHandler<'b>,
    ) -> Self {
        Self {
            hal,
            space,
            cpu: MockCpu::for_start(space, start),
            on_trap,
            start,
            stopped: None,
        }
    }

    /// Entry address when started by Fork, `None` for a loaded program.
    pub fn fork_entry(&self) -> Option<u32> {
        match self.start {
            UserStart::Program => None,
            UserStart::Function(entry) => Some(entry),
        }
    }

    /// Trap into the kernel with `opcode` in r2 and `args` in r4..=r7.
    ///
    /// Returns r2 after the trap. Once the process has exited or the
    /// machine halted, further calls do nothing and return -1.
    pub fn syscall(&mut self, opcode: i32, args: [i32; 4]) -> i32 {
        if self.stopped.is_some() {
            self.hal
                .debug_write(&format!("[mock-hal] syscall {} after stop ignored", opcode));
            return -1;
        }
        self.cpu.user[2] = opcode;
        self.cpu.user[4..8].copy_from_slice(&args);
        self.raise(SYSCALL_EXCEPTION);
        self.cpu.user[2]
    }

    /// Raise an arbitrary exception.
    pub fn raise(&mut self, cause: u32) -> TrapDisposition {
        self.hal.advance_ticks(SYSCALL_TICKS);
        let disposition = (self.on_trap)(cause, &mut self.cpu);
        if disposition != TrapDisposition::Resume {
            self.stopped = Some(disposition);
        }
        disposition
    }

    /// Whether the process may keep running.
    pub fn is_running(&self) -> bool {
        self.stopped.is_none()
    }

    pub fn stopped(&self) -> Option<TrapDisposition> {
        self.stopped
    }

    pub fn cpu(&self) -> &MockCpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut MockCpu {
        &mut self.cpu
    }

    /// Current PC triple as (prev, pc, next).
    pub fn pc_triple(&self) -> (i32, i32, i32) {
        (
            self.cpu.user[PREV_PC_REG],
            self.cpu.user[PC_REG],
            self.cpu.user[NEXT_PC_REG],
        )
    }

    /// Store `bytes` at `vaddr`. `false` if any byte is unmapped.
    pub fn write_bytes(&self, vaddr: u32, bytes: &[u8]) -> bool {
        bytes.iter().enumerate().all(|(i, b)| {
            vaddr
                .checked_add(i as u32)
                .and_then(|v| self.space.translate(v))
                .is_some_and(|paddr| self.hal.write_byte(paddr, *b).is_ok())
        })
    }

    /// Store a NUL-terminated string at `vaddr`.
    pub fn write_cstr(&self, vaddr: u32, s: &str) -> bool {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.write_bytes(vaddr, &bytes)
    }

    /// Load `len` bytes from `vaddr`.
    pub fn read_bytes(&self, vaddr: u32, len: usize) -> Option<Vec<u8>> {
        (0..len)
            .map(|i| {
                let v = vaddr.checked_add(i as u32)?;
                self.hal.read_byte(self.space.translate(v)?)
            })
            .collect()
    }

    /// Size of this process's address space in bytes.
    pub fn space_size(&self) -> usize {
        self.space.size()
    }
}
