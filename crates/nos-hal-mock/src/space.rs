//! Paged address spaces over the mock physical memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use nos_hal::AddressTranslator;

use crate::MockProgram;

/// Bytes per page
pub const PAGE_SIZE: usize = 128;

/// One user address space: a linear page table into physical frames.
pub struct MockSpace {
    base: u32,
    frames: Vec<usize>,
    released: AtomicBool,
    program: Mutex<Option<MockProgram>>,
}

impl MockSpace {
    pub(crate) fn new(base: u32, frames: Vec<usize>) -> Self {
        Self {
            base,
            frames,
            released: AtomicBool::new(false),
            program: Mutex::new(None),
        }
    }

    /// Physical frames backing this space, in virtual page order.
    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Mark released. Returns `false` if it already was.
    pub(crate) fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    /// The program loaded into this space, if any.
    pub fn program(&self) -> Option<MockProgram> {
        self.program
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_program(&self, program: Option<MockProgram>) {
        *self.program.lock().unwrap_or_else(PoisonError::into_inner) = program;
    }
}

impl AddressTranslator for MockSpace {
    fn translate(&self, vaddr: u32) -> Option<usize> {
        if self.is_released() {
            return None;
        }
        let vaddr = vaddr as usize;
        let frame = self.frames.get(vaddr / PAGE_SIZE)?;
        Some(frame * PAGE_SIZE + vaddr % PAGE_SIZE)
    }

    fn size(&self) -> usize {
        self.frames.len() * PAGE_SIZE
    }

    fn page_table_base(&self) -> u32 {
        self.base
    }
}

impl std::fmt::Debug for MockSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSpace")
            .field("base", &self.base)
            .field("frames", &self.frames)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_across_pages() {
        let space = MockSpace::new(1, vec![5, 2]);
        assert_eq!(space.translate(0), Some(5 * PAGE_SIZE));
        assert_eq!(space.translate(PAGE_SIZE as u32 + 3), Some(2 * PAGE_SIZE + 3));
        assert_eq!(space.translate(2 * PAGE_SIZE as u32), None);
        assert_eq!(space.size(), 2 * PAGE_SIZE);
    }

    #[test]
    fn test_released_space_does_not_translate() {
        let space = MockSpace::new(1, vec![0]);
        assert!(space.mark_released());
        assert!(!space.mark_released());
        assert_eq!(space.translate(0), None);
    }
}
