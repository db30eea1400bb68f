//! Coordinator configuration.

/// Default capacity of the coordinator's request channel.
pub const DEFAULT_REQUEST_CHANNEL_CAPACITY: usize = 1000;

/// Default capacity of each client's response outbox.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

/// Configuration for the coordinator actor.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Request channel capacity.
    pub channel_capacity: usize,

    /// Response outbox capacity per connected client.
    pub outbox_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_REQUEST_CHANNEL_CAPACITY,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}
