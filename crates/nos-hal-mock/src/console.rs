//! Scripted console device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use nos_hal::ConsoleDevice;

/// Console with a scripted input queue and a recorded output stream.
///
/// `get_char` blocks until input is pushed or the console is shut down.
pub struct MockConsole {
    input: Mutex<VecDeque<u8>>,
    available: Condvar,
    closed: AtomicBool,
    output: Mutex<Vec<u8>>,
}

impl MockConsole {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            closed: AtomicBool::new(false),
            output: Mutex::new(Vec::new()),
        }
    }

    /// Queue bytes for future `get_char` calls.
    pub fn push_input(&self, bytes: &[u8]) {
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        input.extend(bytes.iter().copied());
        self.available.notify_all();
    }

    /// Bytes queued but not yet read.
    pub fn pending_input(&self) -> usize {
        self.input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Everything written so far, including echoed input.
    pub fn output(&self) -> Vec<u8> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Output decoded lossily as UTF-8.
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output()).into_owned()
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn clear_output(&self) {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for MockConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleDevice for MockConsole {
    fn get_char(&self) -> Option<u8> {
        let mut input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(byte) = input.pop_front() {
                return Some(byte);
            }
            input = self
                .available
                .wait(input)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn put_char(&self, byte: u8) {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(byte);
    }

    fn shutdown(&self) {
        // Flag is set under the input lock so a reader cannot miss it
        let _input = self.input.lock().unwrap_or_else(PoisonError::into_inner);
        self.closed.store(true, Ordering::SeqCst);
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_output_recorded_in_order() {
        let console = MockConsole::new();
        for b in b"hi!" {
            console.put_char(*b);
        }
        assert_eq!(console.output_string(), "hi!");
    }

    #[test]
    fn test_get_char_blocks_until_input() {
        let console = Arc::new(MockConsole::new());
        let reader = {
            let console = Arc::clone(&console);
            thread::spawn(move || console.get_char())
        };
        console.push_input(b"x");
        assert_eq!(reader.join().unwrap(), Some(b'x'));
        assert_eq!(console.pending_input(), 0);
    }

    #[test]
    fn test_shutdown_releases_blocked_reader() {
        let console = Arc::new(MockConsole::new());
        let reader = {
            let console = Arc::clone(&console);
            thread::spawn(move || console.get_char())
        };
        console.shutdown();
        assert_eq!(reader.join().unwrap(), None);
        assert!(console.is_shut_down());

        console.push_input(b"late");
        assert_eq!(console.get_char(), None);
    }
}
