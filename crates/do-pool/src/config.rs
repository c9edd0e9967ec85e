//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;
use crate::lifecycle::Poolable;

/// Default maximum number of concurrently reserved instances per key.
pub const DEFAULT_MAX_RESERVED: usize = 4;

/// Configuration shared by every pool of a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of instances reserved at the same time for one key.
    ///
    /// Idle available instances do not count against this limit.
    pub max_reserved: usize,

    /// Upper bound for blocking acquisitions. `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,

    /// Available instances idle for at least this long are disposed by
    /// idle eviction. `None` disables eviction.
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_reserved: DEFAULT_MAX_RESERVED,
            acquire_timeout: None,
            idle_timeout: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the default configuration for a poolable type.
    ///
    /// The capacity comes from [`Poolable::MAX_RESERVED`].
    #[must_use]
    pub fn for_poolable<T: Poolable>() -> Self {
        Self {
            max_reserved: T::MAX_RESERVED,
            ..Self::default()
        }
    }

    /// Set the maximum number of concurrently reserved instances.
    #[must_use]
    pub fn max_reserved(mut self, max: usize) -> Self {
        self.max_reserved = max;
        self
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Set the idle timeout used by idle eviction.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_reserved == 0 {
            return Err(PoolError::Config(
                "max_reserved must be greater than 0".into(),
            ));
        }

        if self.acquire_timeout.is_some_and(|t| t.is_zero()) {
            return Err(PoolError::Config(
                "acquire_timeout must be greater than 0".into(),
            ));
        }

        if self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(PoolError::Config(
                "idle_timeout must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
