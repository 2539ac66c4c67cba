//! State store constants.

/// Root of every key in the registry.
pub const REGISTRY_PREFIX: &str = "/registry";

/// Number of recent mutations kept in the in-memory event log.
pub const EVENT_LOG_CAPACITY: usize = 4096;

/// Capacity of the broadcast channel feeding live watchers.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
