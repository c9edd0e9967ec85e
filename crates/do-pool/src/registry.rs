//! Lazily populated mapping from pooling key to [`Pool`].

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::Poolable;
use crate::pool::{FlushReport, Pool, PoolStatus, Pooled};

/// The pools of one poolable type, one per distinct pooling key.
///
/// Construction requests go through [`create`](PoolRegistry::create): the
/// registry derives the key from the arguments, resolves or creates the pool
/// for that key and acquires an instance from it. Every pool shares the
/// registry's configuration.
///
/// Cloning a `PoolRegistry` is cheap and yields another handle to the same
/// pools.
///
/// # Example
///
/// ```rust,ignore
/// use data_objects_pool::PoolRegistry;
/// use std::time::Duration;
///
/// let registry = PoolRegistry::<Connection>::builder()
///     .max_reserved(8)
///     .idle_timeout(Duration::from_secs(300))
///     .build()?;
///
/// let conn = registry.create(&uri)?;
/// // Use connection...
/// conn.release()?;
/// ```
pub struct PoolRegistry<T: Poolable> {
    inner: Arc<RegistryInner<T>>,
}

pub(crate) struct RegistryInner<T: Poolable> {
    config: PoolConfig,
    state: Mutex<RegistryState<T>>,
}

struct RegistryState<T: Poolable> {
    pools: HashMap<T::Key, Pool<T>>,
    closed: bool,
}

impl<T: Poolable> PoolRegistry<T> {
    /// Create a registry with the type's default configuration.
    ///
    /// The capacity of every pool is [`Poolable::MAX_RESERVED`].
    #[must_use]
    pub fn new() -> Self {
        const {
            assert!(T::MAX_RESERVED > 0, "Poolable::MAX_RESERVED must be greater than 0");
        }
        Self::with_validated_config(PoolConfig::for_poolable::<T>())
    }

    /// Create a new registry builder.
    #[must_use]
    pub fn builder() -> PoolRegistryBuilder<T> {
        PoolRegistryBuilder::new()
    }

    /// Create a registry with the given configuration.
    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self::with_validated_config(config))
    }

    fn with_validated_config(config: PoolConfig) -> Self {
        tracing::info!(
            max_reserved = config.max_reserved,
            idle_timeout = ?config.idle_timeout,
            "pool registry created"
        );

        Self {
            inner: Arc::new(RegistryInner {
                config,
                state: Mutex::new(RegistryState {
                    pools: HashMap::new(),
                    closed: false,
                }),
            }),
        }
    }

    /// Construct an instance through its pool.
    ///
    /// Derives the key with [`Poolable::pooling_key`], resolves the pool for
    /// it and acquires an instance, constructing one with
    /// [`Poolable::create`] if nothing can be reused. Blocks while the pool
    /// is exhausted.
    pub fn create(&self, args: &T::Args) -> Result<Pooled<T>, PoolError> {
        self.lookup(&T::pooling_key(args)).acquire(args, &T::create)
    }

    /// Like [`create`](PoolRegistry::create), waiting at most `timeout`.
    pub fn create_timeout(
        &self,
        args: &T::Args,
        timeout: Duration,
    ) -> Result<Pooled<T>, PoolError> {
        self.lookup(&T::pooling_key(args))
            .acquire_timeout(args, &T::create, timeout)
    }

    /// Like [`create`](PoolRegistry::create), returning `Ok(None)` instead of
    /// waiting.
    pub fn try_create(&self, args: &T::Args) -> Result<Option<Pooled<T>>, PoolError> {
        self.lookup(&T::pooling_key(args))
            .try_acquire(args, &T::create)
    }

    /// Get the pool for `key`, creating it if the key has not been seen yet.
    ///
    /// Concurrent lookups of the same new key observe the same pool.
    pub fn lookup(&self, key: &T::Key) -> Pool<T> {
        let mut state = self.inner.state.lock();
        if let Some(pool) = state.pools.get(key) {
            return pool.clone();
        }

        let pool =
            Pool::with_validated_config(format!("{key:?}"), &self.inner.config, state.closed);
        state.pools.insert(key.clone(), pool.clone());
        tracing::debug!(key = ?key, pools = state.pools.len(), "registered pool for new key");
        pool
    }

    /// Get the pool for `key` without creating it.
    #[must_use]
    pub fn get(&self, key: &T::Key) -> Option<Pool<T>> {
        self.inner.state.lock().pools.get(key).cloned()
    }

    /// Status of the pool for `key`, if one exists.
    #[must_use]
    pub fn status(&self, key: &T::Key) -> Option<PoolStatus> {
        self.get(key).map(|pool| pool.status())
    }

    /// Number of distinct keys with a registered pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().pools.len()
    }

    /// Check if no pool has been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().pools.is_empty()
    }

    /// Keys with a registered pool, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<T::Key> {
        self.inner.state.lock().pools.keys().cloned().collect()
    }

    /// Flush every registered pool.
    ///
    /// Pools stay registered; they are empty afterwards and accept new
    /// acquisitions.
    pub fn flush(&self) -> FlushReport {
        let mut report = FlushReport::default();
        for pool in self.pools() {
            report.merge(pool.flush());
        }

        tracing::info!(
            disposed = report.disposed,
            revoked = report.revoked,
            failed = report.failures.len(),
            "flushed all pools"
        );
        report
    }

    /// Flush the pool for `key`, if one exists.
    pub fn flush_key(&self, key: &T::Key) -> FlushReport {
        self.get(key).map(|pool| pool.flush()).unwrap_or_default()
    }

    /// Evict idle instances from every pool using the configured
    /// `idle_timeout`.
    ///
    /// Does nothing if no idle timeout is configured. Returns the number of
    /// evicted instances.
    pub fn evict_idle(&self) -> usize {
        let Some(max_idle) = self.inner.config.idle_timeout else {
            return 0;
        };

        self.pools()
            .iter()
            .map(|pool| pool.evict_idle(max_idle))
            .sum()
    }

    /// Close every pool.
    ///
    /// Pools registered afterwards start out closed as well.
    pub fn close(&self) -> FlushReport {
        let pools = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            state.pools.values().cloned().collect::<Vec<_>>()
        };

        let mut report = FlushReport::default();
        for pool in pools {
            report.merge(pool.close());
        }

        tracing::info!("pool registry closed");
        report
    }

    /// Check if the registry has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Get the configuration shared by every pool.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Snapshot of the registered pools, taken without holding the lock
    /// while they are used.
    fn pools(&self) -> Vec<Pool<T>> {
        self.inner.state.lock().pools.values().cloned().collect()
    }

    #[cfg_attr(not(feature = "reaper"), allow(dead_code))]
    pub(crate) fn downgrade(&self) -> Weak<RegistryInner<T>> {
        Arc::downgrade(&self.inner)
    }

    #[cfg_attr(not(feature = "reaper"), allow(dead_code))]
    pub(crate) fn upgrade(inner: &Weak<RegistryInner<T>>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }
}

impl<T: Poolable> Default for PoolRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Poolable> Clone for PoolRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Poolable> fmt::Debug for PoolRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("config", &self.inner.config)
            .field("pools", &self.len())
            .finish()
    }
}

/// Builder for creating a pool registry.
///
/// # Example
///
/// ```rust,ignore
/// let registry = PoolRegistry::<Connection>::builder()
///     .max_reserved(16)
///     .acquire_timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub struct PoolRegistryBuilder<T: Poolable> {
    config: PoolConfig,
    _poolable: PhantomData<fn() -> T>,
}

impl<T: Poolable> PoolRegistryBuilder<T> {
    /// Create a new builder with the type's default configuration.
    pub fn new() -> Self {
        Self {
            config: PoolConfig::for_poolable::<T>(),
            _poolable: PhantomData,
        }
    }

    /// Set the whole configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum number of concurrently reserved instances per key.
    #[must_use]
    pub fn max_reserved(mut self, max: usize) -> Self {
        self.config.max_reserved = max;
        self
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = Some(timeout);
        self
    }

    /// Set the idle timeout used by idle eviction.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Build the registry.
    pub fn build(self) -> Result<PoolRegistry<T>, PoolError> {
        PoolRegistry::with_config(self.config)
    }
}

impl<T: Poolable> Default for PoolRegistryBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Poolable> fmt::Debug for PoolRegistryBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistryBuilder")
            .field("config", &self.config)
            .finish()
    }
}
