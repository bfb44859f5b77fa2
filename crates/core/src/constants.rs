//! Shared constants for the framework

use std::time::Duration;

/// Interval used by Periodic modules that do not declare one (1 second)
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Cadence of the scheduler-wide sweep over Periodic modules
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// CSS class added to widgets of modules that react to clicks
pub const CLICKABLE_CLASS: &str = "clickable";

/// Capacity of a message-channel listener's queue
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Read buffer size for chunk-framed socket listeners
pub const DEFAULT_SOCKET_CHUNK_SIZE: usize = 4096;
