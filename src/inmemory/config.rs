//! Options accepted when opening an in-memory storage instance.

use crate::storage::DEFAULT_CLEANUP_INTERVAL;
use std::time::Duration;

/// In-memory storage configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Expiry applied by the native table's TTL-less `set` (None = never)
    pub default_expiration: Option<Duration>,

    /// Interval between active expiry sweeps (None or zero = never sweep)
    pub cleanup_interval: Option<Duration>,

    /// Check versions in `compare_and_set` instead of writing unconditionally
    pub strict_compare_and_set: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_expiration: None,
            cleanup_interval: Some(DEFAULT_CLEANUP_INTERVAL),
            strict_compare_and_set: false,
        }
    }
}

impl StorageConfig {
    pub fn with_default_expiration(mut self, ttl: Duration) -> Self {
        self.default_expiration = Some(ttl);
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Disables active expiry; entries are reclaimed only on access or by compaction.
    pub fn without_cleanup(mut self) -> Self {
        self.cleanup_interval = None;
        self
    }

    pub fn with_strict_compare_and_set(mut self, strict: bool) -> Self {
        self.strict_compare_and_set = strict;
        self
    }

    /// Returns the sweep interval, or None if sweeping is disabled.
    pub fn effective_cleanup_interval(&self) -> Option<Duration> {
        self.cleanup_interval.filter(|interval| !interval.is_zero())
    }
}
