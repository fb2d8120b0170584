//! Kernel configuration.

use serde::{Deserialize, Serialize};

use nos_axiom::DEFAULT_SYSLOG_CAPACITY;
use nos_hal::mips::INSTRUCTION_WIDTH;

/// OpenFileId used for input from the keyboard
pub const CONSOLE_INPUT: i32 = 0;

/// OpenFileId used for output to the display
pub const CONSOLE_OUTPUT: i32 = 1;

/// Longest path or file name read from user memory, excluding the terminator
pub const DEFAULT_MAX_PATH_LEN: usize = 256;

/// Tunables fixed at boot.
///
/// Missing fields take their defaults when deserialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Bytes the PC triple advances after a syscall trap
    pub instruction_width: i32,
    /// Longest NUL-terminated string read from user memory
    pub max_path_len: usize,
    /// Maximum concurrent console leases; `None` is unlimited
    pub console_lease_limit: Option<usize>,
    /// Events kept by the syscall audit log
    pub syslog_capacity: usize,
    /// File id read by console Read
    pub console_input: i32,
    /// File id written by console Write
    pub console_output: i32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            instruction_width: INSTRUCTION_WIDTH,
            max_path_len: DEFAULT_MAX_PATH_LEN,
            console_lease_limit: None,
            syslog_capacity: DEFAULT_SYSLOG_CAPACITY,
            console_input: CONSOLE_INPUT,
            console_output: CONSOLE_OUTPUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.instruction_width, 4);
        assert_eq!(config.console_input, 0);
        assert_eq!(config.console_output, 1);
        assert!(config.console_lease_limit.is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: KernelConfig =
            serde_json::from_str(r#"{ "console_lease_limit": 2, "max_path_len": 32 }"#).unwrap();
        assert_eq!(config.console_lease_limit, Some(2));
        assert_eq!(config.max_path_len, 32);
        assert_eq!(config.instruction_width, 4);
        assert_eq!(config.syslog_capacity, DEFAULT_SYSLOG_CAPACITY);
    }
}
