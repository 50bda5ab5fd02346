//! Tunables for the chat service

use std::time::Duration;

/// Default upload limit for images and files (10 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Configuration for `ChatService`
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// How long a typing heartbeat stays valid
    pub typing_ttl: Duration,
    /// How often stale typing entries are swept
    pub typing_sweep_interval: Duration,
    /// Idle time after the last keystroke before the client reports `false`
    pub typing_debounce: Duration,
    /// Largest accepted attachment in bytes
    pub max_file_size: u64,
    /// Per-conversation event buffer before slow subscribers lag
    pub bus_capacity: usize,
    /// Page size used when the caller does not pass one
    pub default_page_size: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            typing_ttl: Duration::from_secs(5),
            typing_sweep_interval: Duration::from_secs(1),
            typing_debounce: Duration::from_millis(2000),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            bus_capacity: 256,
            default_page_size: 50,
        }
    }
}
