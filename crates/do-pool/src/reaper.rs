//! Background disposal of idle instances.
//!
//! The reaper is a tokio task that periodically runs
//! [`PoolRegistry::evict_idle`]. It holds only a weak reference to the
//! registry and stops on its own once the registry is dropped.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::PoolError;
use crate::lifecycle::Poolable;
use crate::registry::PoolRegistry;

/// Handle to a running idle reaper task.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct IdleReaper {
    handle: JoinHandle<()>,
}

impl IdleReaper {
    /// Stop the reaper.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Check if the reaper task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for IdleReaper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl<T: Poolable> PoolRegistry<T> {
    /// Spawn a task on the current tokio runtime that evicts idle instances
    /// every `period`.
    ///
    /// Requires an `idle_timeout` in the registry configuration. Disposal
    /// runs on the blocking thread pool.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let registry = PoolRegistry::<Connection>::builder()
    ///     .idle_timeout(Duration::from_secs(300))
    ///     .build()?;
    ///
    /// let _reaper = registry.spawn_idle_reaper(Duration::from_secs(30))?;
    /// ```
    pub fn spawn_idle_reaper(&self, period: Duration) -> Result<IdleReaper, PoolError> {
        if self.config().idle_timeout.is_none() {
            return Err(PoolError::Config(
                "idle reaper requires an idle_timeout".into(),
            ));
        }
        if period.is_zero() {
            return Err(PoolError::Config(
                "reaper period must be greater than 0".into(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PoolError::Config(format!("idle reaper requires a tokio runtime: {e}")))?;

        let registry = self.downgrade();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(registry) = PoolRegistry::upgrade(&registry) else {
                    tracing::debug!("pool registry dropped, stopping idle reaper");
                    break;
                };

                match tokio::task::spawn_blocking(move || registry.evict_idle()).await {
                    Ok(0) => {}
                    Ok(evicted) => tracing::debug!(evicted, "idle reaper evicted instances"),
                    Err(err) => {
                        tracing::warn!(error = %err, "idle reaper eviction failed");
                    }
                }
            }
        });

        tracing::debug!(period = ?period, "idle reaper started");
        Ok(IdleReaper { handle })
    }
}
