//! Mock HAL implementation for testing the Nachos kernel
//!
//! A std-hosted machine: paged physical memory, a scripted console, a
//! name → program filesystem and a scheduler that runs every kernel thread
//! on its own host thread. User programs are Rust closures driving a
//! [`UserContext`].

pub mod console;
pub mod cpu;
pub mod space;

pub use console::MockConsole;
pub use cpu::{MockCpu, UserContext, SYSCALL_TICKS};
pub use space::{MockSpace, PAGE_SIZE};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nos_hal::{ConsoleDevice, HalError, OpenFileId, ThreadBody, TrapHandler, UserStart, HAL};

/// A user program: runs against its process's [`UserContext`].
pub type MockProgram = Arc<dyn Fn(&mut UserContext<'_, '_>) + Send + Sync>;

/// Default physical memory, in pages
pub const DEFAULT_PHYS_PAGES: usize = 128;

/// Default address space size, in pages
pub const DEFAULT_SPACE_PAGES: usize = 8;

/// First id handed out by `open`; 0 and 1 belong to the console
const FIRST_FILE_ID: OpenFileId = 2;

#[derive(Clone)]
enum MockFile {
    Program(MockProgram),
    Data,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock machine for kernel tests.
pub struct MockHal {
    /// Simulated time in ticks
    ticks: AtomicU64,
    halted: AtomicBool,
    /// Captured debug messages
    debug_log: Mutex<Vec<String>>,
    memory: Mutex<Vec<u8>>,
    free_frames: Mutex<Vec<usize>>,
    space_pages: usize,
    next_space: AtomicU32,
    console: Arc<MockConsole>,
    files: Mutex<BTreeMap<String, MockFile>>,
    open_files: Mutex<BTreeMap<OpenFileId, String>>,
    next_file: AtomicU32,
    threads: Mutex<Vec<JoinHandle<()>>>,
    finished: AtomicU64,
    burst_updates: Mutex<Vec<(u32, i32)>>,
}

impl MockHal {
    /// Create a mock machine with the default memory layout.
    pub fn new() -> Self {
        Self::with_memory(DEFAULT_PHYS_PAGES, DEFAULT_SPACE_PAGES)
    }

    /// Create a mock machine with `phys_pages` of memory and
    /// `space_pages` per address space.
    pub fn with_memory(phys_pages: usize, space_pages: usize) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            halted: AtomicBool::new(false),
            debug_log: Mutex::new(Vec::new()),
            memory: Mutex::new(vec![0; phys_pages * PAGE_SIZE]),
            free_frames: Mutex::new((0..phys_pages).rev().collect()),
            space_pages,
            next_space: AtomicU32::new(1),
            console: Arc::new(MockConsole::new()),
            files: Mutex::new(BTreeMap::new()),
            open_files: Mutex::new(BTreeMap::new()),
            next_file: AtomicU32::new(FIRST_FILE_ID as u32),
            threads: Mutex::new(Vec::new()),
            finished: AtomicU64::new(0),
            burst_updates: Mutex::new(Vec::new()),
        }
    }

    // === Programs and files ===

    /// Install an executable under `name`.
    pub fn install_program<F>(&self, name: &str, program: F)
    where
        F: Fn(&mut UserContext<'_, '_>) + Send + Sync + 'static,
    {
        lock(&self.files).insert(String::from(name), MockFile::Program(Arc::new(program)));
    }

    /// Install a plain (non-executable) file under `name`.
    pub fn install_file(&self, name: &str) {
        lock(&self.files).insert(String::from(name), MockFile::Data);
    }

    pub fn file_exists(&self, name: &str) -> bool {
        lock(&self.files).contains_key(name)
    }

    /// Files currently open.
    pub fn open_file_count(&self) -> usize {
        lock(&self.open_files).len()
    }

    // === Devices ===

    pub fn console_device(&self) -> &Arc<MockConsole> {
        &self.console
    }

    // === Time ===

    pub fn advance_ticks(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }

    // === Debug log ===

    /// Get all captured debug messages
    pub fn get_debug_log(&self) -> Vec<String> {
        lock(&self.debug_log).clone()
    }

    /// Check if a specific message was logged
    pub fn has_log_containing(&self, substr: &str) -> bool {
        lock(&self.debug_log).iter().any(|msg| msg.contains(substr))
    }

    /// Clear the debug log
    pub fn clear_debug_log(&self) {
        lock(&self.debug_log).clear();
    }

    // === Memory ===

    /// Physical frames not owned by any space.
    pub fn free_frame_count(&self) -> usize {
        lock(&self.free_frames).len()
    }

    /// Whether every byte of `frame` is zero.
    pub fn frame_is_zeroed(&self, frame: usize) -> bool {
        let memory = lock(&self.memory);
        memory
            .get(frame * PAGE_SIZE..(frame + 1) * PAGE_SIZE)
            .is_some_and(|page| page.iter().all(|b| *b == 0))
    }

    // === Scheduler ===

    /// Join every thread handed to `ready_to_run`, including threads
    /// started while waiting. Re-raises the panic of a failed thread.
    pub fn wait_idle(&self) {
        loop {
            let handles: Vec<_> = lock(&self.threads).drain(..).collect();
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(panic) = handle.join() {
                    std::panic::resume_unwind(panic);
                }
            }
        }
    }

    /// Threads that reported `finish_current`.
    pub fn finished_threads(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }

    /// Burst predictions forwarded by the kernel, in order.
    pub fn burst_updates(&self) -> Vec<(u32, i32)> {
        lock(&self.burst_updates).clone()
    }

    fn take_frames(&self, count: usize) -> Result<Vec<usize>, HalError> {
        let mut free = lock(&self.free_frames);
        if free.len() < count {
            return Err(HalError::OutOfMemory);
        }
        let at = free.len() - count;
        Ok(free.split_off(at))
    }

    fn zero_frame(memory: &mut [u8], frame: usize) {
        memory[frame * PAGE_SIZE..(frame + 1) * PAGE_SIZE].fill(0);
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl HAL for MockHal {
    type Space = MockSpace;

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        self.debug_write("[mock-hal] machine halted");
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    fn now_ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn debug_write(&self, msg: &str) {
        lock(&self.debug_log).push(String::from(msg));
    }

    fn memory_size(&self) -> usize {
        lock(&self.memory).len()
    }

    fn read_byte(&self, paddr: usize) -> Option<u8> {
        lock(&self.memory).get(paddr).copied()
    }

    fn write_byte(&self, paddr: usize, value: u8) -> Result<(), HalError> {
        let mut memory = lock(&self.memory);
        let byte = memory.get_mut(paddr).ok_or(HalError::InvalidAddress)?;
        *byte = value;
        Ok(())
    }

    fn allocate_space(&self) -> Result<MockSpace, HalError> {
        let frames = self.take_frames(self.space_pages)?;
        let mut memory = lock(&self.memory);
        for frame in &frames {
            Self::zero_frame(&mut memory, *frame);
        }
        let base = self.next_space.fetch_add(1, Ordering::SeqCst);
        Ok(MockSpace::new(base, frames))
    }

    fn fork_space(&self, parent: &MockSpace) -> Result<MockSpace, HalError> {
        let frames = self.take_frames(parent.frames().len())?;
        {
            let mut memory = lock(&self.memory);
            for (src, dst) in parent.frames().iter().zip(&frames) {
                memory.copy_within(src * PAGE_SIZE..(src + 1) * PAGE_SIZE, dst * PAGE_SIZE);
            }
        }
        let base = self.next_space.fetch_add(1, Ordering::SeqCst);
        let child = MockSpace::new(base, frames);
        child.set_program(parent.program());
        Ok(child)
    }

    fn release_space(&self, space: &MockSpace) {
        if !space.mark_released() {
            self.debug_write("[mock-hal] space released twice");
            return;
        }
        {
            let mut memory = lock(&self.memory);
            for frame in space.frames() {
                Self::zero_frame(&mut memory, *frame);
            }
        }
        lock(&self.free_frames).extend_from_slice(space.frames());
    }

    fn load_executable(&self, space: &MockSpace, file: OpenFileId) -> Result<(), HalError> {
        let name = lock(&self.open_files)
            .get(&file)
            .cloned()
            .ok_or(HalError::IoError)?;
        match lock(&self.files).get(&name) {
            Some(MockFile::Program(program)) => {
                space.set_program(Some(Arc::clone(program)));
                Ok(())
            }
            _ => Err(HalError::BadExecutable),
        }
    }

    fn run_user(&self, space: &MockSpace, start: UserStart, on_trap: &mut TrapHandler<'_>) {
        let Some(program) = space.program() else {
            self.debug_write("[mock-hal] run_user on a space with no program");
            return;
        };
        let mut ctx = UserContext::new(self, space, start, on_trap);
        program(&mut ctx);
    }

    fn ready_to_run(&self, name: &str, body: ThreadBody) -> Result<(), HalError> {
        let handle = thread::Builder::new()
            .name(String::from(name))
            .spawn(body)
            .map_err(|_| HalError::SpawnFailed)?;
        lock(&self.threads).push(handle);
        Ok(())
    }

    fn yield_current(&self) {
        thread::yield_now();
    }

    fn sleep_current(&self, ticks: u32) {
        self.advance_ticks(u64::from(ticks));
        thread::sleep(Duration::from_micros(u64::from(ticks)));
    }

    fn finish_current(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn update_burst_prediction(&self, space_id: u32, predicted: i32) {
        lock(&self.burst_updates).push((space_id, predicted));
    }

    fn open(&self, name: &str) -> Option<OpenFileId> {
        if !lock(&self.files).contains_key(name) {
            return None;
        }
        let id = self.next_file.fetch_add(1, Ordering::SeqCst) as OpenFileId;
        lock(&self.open_files).insert(id, String::from(name));
        Some(id)
    }

    fn create(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        lock(&self.files)
            .entry(String::from(name))
            .or_insert(MockFile::Data);
        true
    }

    fn remove(&self, name: &str) -> bool {
        lock(&self.files).remove(name).is_some()
    }

    fn close(&self, file: OpenFileId) {
        lock(&self.open_files).remove(&file);
    }

    fn console(&self) -> Arc<dyn ConsoleDevice> {
        self.console.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nos_hal::mips::SYSCALL_EXCEPTION;
    use nos_hal::{AddressTranslator, Cpu, TrapDisposition};

    #[test]
    fn test_allocate_and_release_space() {
        let hal = MockHal::with_memory(4, 2);
        let a = hal.allocate_space().unwrap();
        let b = hal.allocate_space().unwrap();
        assert_eq!(hal.free_frame_count(), 0);
        assert_eq!(hal.allocate_space().unwrap_err(), HalError::OutOfMemory);

        let paddr = a.translate(3).unwrap();
        hal.write_byte(paddr, 0xAB).unwrap();
        hal.release_space(&a);

        assert_eq!(hal.free_frame_count(), 2);
        assert!(hal.frame_is_zeroed(a.frames()[0]));
        assert_eq!(a.translate(3), None);
        assert_ne!(a.page_table_base(), b.page_table_base());
    }

    #[test]
    fn test_fork_space_copies_contents() {
        let hal = MockHal::with_memory(4, 2);
        let parent = hal.allocate_space().unwrap();
        hal.write_byte(parent.translate(200).unwrap(), 7).unwrap();

        let child = hal.fork_space(&parent).unwrap();
        assert_eq!(hal.read_byte(child.translate(200).unwrap()), Some(7));

        hal.write_byte(child.translate(200).unwrap(), 9).unwrap();
        assert_eq!(hal.read_byte(parent.translate(200).unwrap()), Some(7));
    }

    #[test]
    fn test_load_requires_program() {
        let hal = MockHal::new();
        hal.install_program("prog", |_ctx| {});
        hal.install_file("notes.txt");
        let space = hal.allocate_space().unwrap();

        let data = hal.open("notes.txt").unwrap();
        assert_eq!(
            hal.load_executable(&space, data),
            Err(HalError::BadExecutable)
        );

        let prog = hal.open("prog").unwrap();
        assert!(prog >= FIRST_FILE_ID);
        hal.load_executable(&space, prog).unwrap();
        assert!(space.program().is_some());
        assert_eq!(hal.open("missing"), None);
    }

    #[test]
    fn test_run_user_traps_into_handler() {
        let hal = MockHal::new();
        hal.install_program("prog", |ctx| {
            let r = ctx.syscall(7, [1, 2, 3, 4]);
            assert_eq!(r, 42);
            ctx.syscall(1, [0, 0, 0, 0]);
            assert!(!ctx.is_running());
        });
        let space = hal.allocate_space().unwrap();
        let fd = hal.open("prog").unwrap();
        hal.load_executable(&space, fd).unwrap();

        let mut causes = Vec::new();
        hal.run_user(&space, UserStart::Program, &mut |cause: u32, cpu: &mut dyn Cpu| {
            causes.push((cause, cpu.read_register(2), cpu.read_register(5)));
            if cpu.read_register(2) == 1 {
                TrapDisposition::Exited
            } else {
                cpu.write_register(2, 42);
                TrapDisposition::Resume
            }
        });

        assert_eq!(
            causes,
            vec![(SYSCALL_EXCEPTION, 7, 2), (SYSCALL_EXCEPTION, 1, 0)]
        );
        assert_eq!(hal.now_ticks(), 2 * SYSCALL_TICKS);
    }

    #[test]
    fn test_ready_to_run_and_wait_idle() {
        let hal = Arc::new(MockHal::new());
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            hal.ready_to_run("worker", Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        hal.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_console_is_shared() {
        let hal = MockHal::new();
        hal.console().put_char(b'z');
        assert_eq!(hal.console_device().output(), b"z");
    }
}
