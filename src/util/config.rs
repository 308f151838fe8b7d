//! Tunables left to the embedder, in the shape of the teacher's
//! `SharedConfig` (`examples/hahatianx-lumo/src/config/app_config.rs`) but
//! trimmed to a plain `Default`-seeded struct: the spec treats configuration
//! as an external collaborator, so there is no env/file layering here.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PartylineConfig {
    /// TTL for a `GlobalLockOwner` entry before it is considered abandoned.
    pub global_lock_ttl: Duration,
    /// Sleep between retry attempts in `GlobalLockManager::try_lock`.
    pub retry_interval: Duration,
    /// Capacity of the in-memory diagnostics ring buffer.
    pub diagnostics_capacity: usize,
}

impl Default for PartylineConfig {
    fn default() -> Self {
        Self {
            global_lock_ttl: Duration::from_secs(30 * 60),
            retry_interval: Duration::from_secs(1),
            diagnostics_capacity: 4096,
        }
    }
}
