//! Console and filesystem syscall handlers
//!
//! Read and Write only reach the console; other file ids are accepted and
//! ignored. Create, Open, Close and Remove pass straight through to the
//! HAL filesystem.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use nos_hal::{Cpu, HAL};

use super::Kernel;
use crate::console::ConsoleLease;
use crate::process::ProcessRecord;
use crate::syscall::SyscallOutcome;
use crate::uaccess::{check_range, copy_from_user, copy_to_user, read_cstr, user_len, UserPtr};

impl<H: HAL> Kernel<H> {
    /// Read: fill `buf` from the console, stopping after `len` bytes or the
    /// first newline. Every byte is echoed.
    ///
    /// Returns the number of bytes stored, 0 for non-console ids or a
    /// process without a console, -1 for a bad buffer. A read still waiting
    /// for input when the machine halts reports `Halted`.
    pub(crate) fn read(
        &self,
        caller: &ProcessRecord<H>,
        buf: UserPtr,
        len: i32,
        file: i32,
        cpu: &mut dyn Cpu,
    ) -> SyscallOutcome {
        let len = match user_len(len) {
            Ok(l) => l,
            Err(e) => {
                self.log(&format!("read from {}: {}", caller.space_id(), e));
                return SyscallOutcome::Return(-1);
            }
        };
        if file != self.config.console_input {
            return SyscallOutcome::Return(0);
        }
        let Some(lease) = self.console_of(caller) else {
            return SyscallOutcome::Return(0);
        };
        if let Err(e) = check_range(&*self.hal, caller.space(), buf, len) {
            self.log(&format!("read from {}: {}", caller.space_id(), e));
            return SyscallOutcome::Return(-1);
        }

        caller.save_frame(cpu);
        let mut bytes = Vec::with_capacity(len);
        while bytes.len() < len {
            let Some(c) = lease.get_char() else {
                caller.restore_frame(cpu);
                self.log(&format!(
                    "read from {} ended by console shutdown",
                    caller.space_id()
                ));
                return SyscallOutcome::Halted;
            };
            lease.put_char(c);
            bytes.push(c);
            if c == b'\n' {
                break;
            }
        }
        caller.restore_frame(cpu);

        match copy_to_user(&*self.hal, caller.space(), buf, &bytes) {
            Ok(()) => SyscallOutcome::Return(bytes.len() as i32),
            Err(e) => {
                self.log(&format!("read from {}: {}", caller.space_id(), e));
                SyscallOutcome::Return(-1)
            }
        }
    }

    /// Write: emit `len` bytes of `buf` on the console, in order.
    pub(crate) fn write(
        &self,
        caller: &ProcessRecord<H>,
        buf: UserPtr,
        len: i32,
        file: i32,
    ) -> SyscallOutcome {
        let data = match user_len(len)
            .and_then(|len| copy_from_user(&*self.hal, caller.space(), buf, len))
        {
            Ok(d) => d,
            Err(e) => {
                self.log(&format!("write from {}: {}", caller.space_id(), e));
                return SyscallOutcome::Return(-1);
            }
        };
        if file != self.config.console_output {
            return SyscallOutcome::Void;
        }
        let Some(lease) = self.console_of(caller) else {
            return SyscallOutcome::Void;
        };

        for byte in data {
            lease.put_char(byte);
        }
        SyscallOutcome::Void
    }

    /// The caller's console lease, with the degraded cases logged.
    fn console_of<'a>(&self, caller: &'a ProcessRecord<H>) -> Option<&'a ConsoleLease> {
        match caller.console() {
            Some(lease) => {
                if lease.is_released() {
                    self.log(&format!(
                        "process {} using console lease {} after holder {} exited",
                        caller.space_id(),
                        lease.id(),
                        lease.holder()
                    ));
                }
                Some(&**lease)
            }
            None => {
                self.log(&format!("process {} has no console", caller.space_id()));
                None
            }
        }
    }

    fn user_name(&self, caller: &ProcessRecord<H>, name: UserPtr) -> Option<String> {
        match read_cstr(&*self.hal, caller.space(), name, self.config.max_path_len) {
            Ok(n) => Some(n),
            Err(e) => {
                self.log(&format!("bad file name from {}: {}", caller.space_id(), e));
                None
            }
        }
    }

    /// Create: 0 on success, -1 on failure.
    pub(crate) fn create(&self, caller: &ProcessRecord<H>, name: UserPtr) -> SyscallOutcome {
        let ok = self
            .user_name(caller, name)
            .is_some_and(|n| self.hal.create(&n));
        SyscallOutcome::Return(if ok { 0 } else { -1 })
    }

    /// Remove: 0 on success, -1 on failure.
    pub(crate) fn remove(&self, caller: &ProcessRecord<H>, name: UserPtr) -> SyscallOutcome {
        let ok = self
            .user_name(caller, name)
            .is_some_and(|n| self.hal.remove(&n));
        SyscallOutcome::Return(if ok { 0 } else { -1 })
    }

    /// Open: the file id, or -1.
    pub(crate) fn open(&self, caller: &ProcessRecord<H>, name: UserPtr) -> SyscallOutcome {
        let file = self
            .user_name(caller, name)
            .and_then(|n| self.hal.open(&n));
        SyscallOutcome::Return(file.unwrap_or(-1))
    }

    pub(crate) fn close(&self, file: i32) -> SyscallOutcome {
        self.hal.close(file);
        SyscallOutcome::Void
    }
}
