//! Bounded pool of reusable instances for a single pooling key.
//!
//! A pool tracks two disjoint sets of instances: *reserved* ones, checked out
//! to exactly one caller and counted against capacity, and *available* ones,
//! checked back in and eligible for reuse. All bookkeeping happens under one
//! mutex; callers that find the pool exhausted park on a condition variable
//! that is signalled whenever capacity or an available instance frees up.

use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hashbrown::HashSet;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::factory::PoolEntryFactory;
use crate::lifecycle::{Disposable, InstanceId, InstanceState};

/// A bounded pool of reusable instances.
///
/// The pool never constructs more than `max_reserved` instances that are
/// checked out at the same time. When nothing is available and the limit is
/// reached, [`acquire`](Pool::acquire) blocks until another caller releases
/// an instance or the pool is flushed.
///
/// Available instances are reused in LIFO order: the most recently released
/// instance is handed out first.
///
/// Cloning a `Pool` is cheap and yields another handle to the same pool.
///
/// # Example
///
/// ```rust
/// use data_objects_pool::{BoxError, Disposable, Pool, PoolConfig};
///
/// struct Buffer(Vec<u8>);
///
/// impl Disposable for Buffer {
///     fn dispose(&mut self) -> Result<(), BoxError> {
///         self.0.clear();
///         Ok(())
///     }
/// }
///
/// let pool = Pool::new(PoolConfig::new().max_reserved(2))?;
/// let factory = |size: &usize| Ok::<_, BoxError>(Buffer(Vec::with_capacity(*size)));
///
/// let first = pool.acquire(&1024_usize, &factory)?;
/// let id = first.id();
/// first.release()?;
///
/// // The released buffer is reused instead of allocating a new one.
/// let again = pool.acquire(&1024_usize, &factory)?;
/// assert_eq!(again.id(), id);
/// # Ok::<(), data_objects_pool::PoolError>(())
/// ```
pub struct Pool<T: Disposable> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    /// Name used in log events, usually the debug form of the pooling key.
    name: String,

    /// Maximum number of concurrently reserved instances.
    max_reserved: usize,

    /// Bound applied by [`Pool::acquire`].
    acquire_timeout: Option<Duration>,

    /// Reserved and available sets.
    state: Mutex<PoolState<T>>,

    /// Signalled when an instance is released or capacity frees up.
    released: Condvar,

    /// Counter for generating instance IDs.
    next_instance_id: AtomicU64,

    /// When the pool was created.
    created_at: Instant,

    /// Pool metrics. Always locked after `state`, never before.
    metrics: Mutex<PoolMetricsInner>,
}

struct PoolState<T> {
    reserved: HashSet<InstanceId>,
    available: Vec<Idle<T>>,
    /// Callers currently parked on `released`.
    waiting: usize,
    closed: bool,
}

/// An available instance and the moment it was checked in.
struct Idle<T> {
    id: InstanceId,
    value: T,
    since: Instant,
}

enum Checkout<T> {
    Reused(Idle<T>),
    Construct(InstanceId),
    Exhausted,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    instances_created: u64,
    instances_disposed: u64,
    acquisitions: u64,
    reuses: u64,
    waits: u64,
    timeouts: u64,
    factory_failures: u64,
    dispose_failures: u64,
}

impl<T: Disposable> Pool<T> {
    /// Create a new pool with the given configuration.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        Self::named("pool", &config)
    }

    pub(crate) fn named(name: impl Into<String>, config: &PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self::with_validated_config(name.into(), config, false))
    }

    /// Create a pool from a configuration that has already been validated.
    pub(crate) fn with_validated_config(name: String, config: &PoolConfig, closed: bool) -> Self {
        tracing::debug!(pool = %name, max_reserved = config.max_reserved, "pool created");

        Self {
            inner: Arc::new(PoolInner {
                name,
                max_reserved: config.max_reserved,
                acquire_timeout: config.acquire_timeout,
                state: Mutex::new(PoolState {
                    reserved: HashSet::new(),
                    available: Vec::new(),
                    waiting: 0,
                    closed,
                }),
                released: Condvar::new(),
                next_instance_id: AtomicU64::new(1),
                created_at: Instant::now(),
                metrics: Mutex::new(PoolMetricsInner::default()),
            }),
        }
    }

    /// Acquire an instance, blocking while the pool is exhausted.
    ///
    /// Returns an available instance if there is one, otherwise constructs a
    /// new one through `factory` as long as fewer than `max_reserved`
    /// instances are checked out. If neither is possible the calling thread
    /// waits until an instance is released or the pool is flushed, bounded
    /// by the configured `acquire_timeout` if any.
    pub fn acquire<A, F>(&self, args: &A, factory: &F) -> Result<Pooled<T>, PoolError>
    where
        A: ?Sized,
        F: PoolEntryFactory<A, T>,
    {
        let deadline = self.inner.acquire_timeout.map(|t| Instant::now() + t);
        self.acquire_until(args, factory, deadline)
    }

    /// Acquire an instance, waiting at most `timeout` for one to free up.
    ///
    /// On expiry the pool is left exactly as if the call never happened.
    pub fn acquire_timeout<A, F>(
        &self,
        args: &A,
        factory: &F,
        timeout: Duration,
    ) -> Result<Pooled<T>, PoolError>
    where
        A: ?Sized,
        F: PoolEntryFactory<A, T>,
    {
        self.acquire_until(args, factory, Some(Instant::now() + timeout))
    }

    /// Try to acquire an instance without waiting.
    ///
    /// Returns `Ok(None)` if the pool is exhausted.
    pub fn try_acquire<A, F>(&self, args: &A, factory: &F) -> Result<Option<Pooled<T>>, PoolError>
    where
        A: ?Sized,
        F: PoolEntryFactory<A, T>,
    {
        let mut state = self.inner.state.lock();
        match self.inner.checkout(&mut state)? {
            Checkout::Reused(idle) => Ok(Some(self.reuse(idle))),
            Checkout::Construct(id) => {
                drop(state);
                self.construct(id, args, factory).map(Some)
            }
            Checkout::Exhausted => Ok(None),
        }
    }

    fn acquire_until<A, F>(
        &self,
        args: &A,
        factory: &F,
        deadline: Option<Instant>,
    ) -> Result<Pooled<T>, PoolError>
    where
        A: ?Sized,
        F: PoolEntryFactory<A, T>,
    {
        let started = Instant::now();
        let mut waited = false;
        let mut state = self.inner.state.lock();

        loop {
            match self.inner.checkout(&mut state)? {
                Checkout::Reused(idle) => return Ok(self.reuse(idle)),
                Checkout::Construct(id) => {
                    drop(state);
                    return self.construct(id, args, factory);
                }
                Checkout::Exhausted => {}
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                self.inner.metrics.lock().timeouts += 1;
                tracing::debug!(pool = %self.inner.name, "timed out waiting for pooled instance");
                return Err(PoolError::AcquireTimeout {
                    waited: started.elapsed(),
                });
            }

            if !waited {
                waited = true;
                self.inner.metrics.lock().waits += 1;
                tracing::trace!(
                    pool = %self.inner.name,
                    reserved = state.reserved.len(),
                    "pool exhausted, waiting for release"
                );
            }

            state.waiting += 1;
            match deadline {
                Some(deadline) => {
                    self.inner.released.wait_until(&mut state, deadline);
                }
                None => self.inner.released.wait(&mut state),
            }
            state.waiting -= 1;
        }
    }

    fn reuse(&self, idle: Idle<T>) -> Pooled<T> {
        tracing::trace!(pool = %self.inner.name, instance = %idle.id, "reusing available instance");
        Pooled::new(idle.id, idle.value, Arc::clone(&self.inner))
    }

    fn construct<A, F>(&self, id: InstanceId, args: &A, factory: &F) -> Result<Pooled<T>, PoolError>
    where
        A: ?Sized,
        F: PoolEntryFactory<A, T>,
    {
        match factory.create(args) {
            Ok(value) => {
                self.inner.metrics.lock().instances_created += 1;
                tracing::debug!(
                    pool = %self.inner.name,
                    instance = %id,
                    "constructed pooled instance"
                );
                Ok(Pooled::new(id, value, Arc::clone(&self.inner)))
            }
            Err(source) => {
                // Give the slot back so a waiter can try its own construction.
                self.inner.state.lock().reserved.remove(&id);
                self.inner.released.notify_one();

                let mut metrics = self.inner.metrics.lock();
                metrics.factory_failures += 1;
                metrics.acquisitions -= 1;
                drop(metrics);

                tracing::warn!(
                    pool = %self.inner.name,
                    error = %source,
                    "pool entry factory failed"
                );
                Err(PoolError::Factory(source))
            }
        }
    }

    /// Dispose every instance and empty both sets.
    ///
    /// Available instances are disposed immediately. Reserved instances are
    /// owned by their holders, so their reservations are revoked instead: the
    /// full capacity becomes available again and each revoked instance is
    /// disposed when its holder releases or drops it.
    ///
    /// Disposal failures are collected in the returned report and never leave
    /// stale entries behind.
    pub fn flush(&self) -> FlushReport {
        let (idle, revoked) = {
            let mut state = self.inner.state.lock();
            let revoked = state.reserved.len();
            state.reserved.clear();
            (mem::take(&mut state.available), revoked)
        };

        for _ in 0..revoked {
            if !self.inner.released.notify_one() {
                break;
            }
        }

        let report = self.inner.dispose_all(idle, revoked);
        if !report.is_empty() {
            tracing::info!(
                pool = %self.inner.name,
                disposed = report.disposed,
                revoked = report.revoked,
                failed = report.failures.len(),
                "pool flushed"
            );
        }
        report
    }

    /// Flush the pool and reject every further acquisition.
    ///
    /// Callers blocked in [`acquire`](Pool::acquire) wake up with
    /// [`PoolError::PoolClosed`]. Instances released afterwards are disposed.
    pub fn close(&self) -> FlushReport {
        self.inner.state.lock().closed = true;
        let report = self.flush();
        self.inner.released.notify_all();

        tracing::info!(pool = %self.inner.name, "pool closed");
        report
    }

    /// Dispose available instances that have been idle for at least `max_idle`.
    ///
    /// Reserved instances are never touched. Returns the number of evicted
    /// instances.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<Idle<T>> = {
            let mut state = self.inner.state.lock();
            let now = Instant::now();
            let (expired, kept): (Vec<_>, Vec<_>) = mem::take(&mut state.available)
                .into_iter()
                .partition(|idle| now.duration_since(idle.since) >= max_idle);
            state.available = kept;
            expired
        };

        if expired.is_empty() {
            return 0;
        }

        let evicted = expired.len();
        let report = self.inner.dispose_all(expired, 0);
        tracing::debug!(
            pool = %self.inner.name,
            evicted,
            failed = report.failures.len(),
            "evicted idle instances"
        );
        evicted
    }

    /// Number of reserved instances.
    #[must_use]
    pub fn reserved_count(&self) -> usize {
        self.inner.state.lock().reserved.len()
    }

    /// Number of available instances.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.inner.state.lock().available.len()
    }

    /// IDs of the reserved instances, in ascending order.
    #[must_use]
    pub fn reserved_ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<_> = self.inner.state.lock().reserved.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// IDs of the available instances, next to be reused first.
    #[must_use]
    pub fn available_ids(&self) -> Vec<InstanceId> {
        let state = self.inner.state.lock();
        state.available.iter().rev().map(|idle| idle.id).collect()
    }

    /// Which set an instance currently belongs to, if any.
    #[must_use]
    pub fn state_of(&self, id: InstanceId) -> Option<InstanceState> {
        let state = self.inner.state.lock();
        if state.reserved.contains(&id) {
            Some(InstanceState::Reserved)
        } else if state.available.iter().any(|idle| idle.id == id) {
            Some(InstanceState::Available)
        } else {
            None
        }
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            available: state.available.len(),
            reserved: state.reserved.len(),
            waiting: state.waiting,
            max_reserved: self.inner.max_reserved,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            instances_created: inner.instances_created,
            instances_disposed: inner.instances_disposed,
            acquisitions: inner.acquisitions,
            reuses: inner.reuses,
            waits: inner.waits,
            timeouts: inner.timeouts,
            factory_failures: inner.factory_failures,
            dispose_failures: inner.dispose_failures,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Check if the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Maximum number of concurrently reserved instances.
    #[must_use]
    pub fn max_reserved(&self) -> usize {
        self.inner.max_reserved
    }

    /// Name used in log events.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl<T: Disposable> PoolInner<T> {
    /// Take an available instance or a construction slot, under the lock.
    fn checkout(&self, state: &mut MutexGuard<'_, PoolState<T>>) -> Result<Checkout<T>, PoolError> {
        if state.closed {
            return Err(PoolError::PoolClosed);
        }

        let checkout = if let Some(idle) = state.available.pop() {
            state.reserved.insert(idle.id);
            self.metrics.lock().reuses += 1;
            Checkout::Reused(idle)
        } else if state.reserved.len() < self.max_reserved {
            let id = InstanceId::new(self.next_instance_id.fetch_add(1, Ordering::Relaxed));
            state.reserved.insert(id);
            Checkout::Construct(id)
        } else {
            return Ok(Checkout::Exhausted);
        };

        assert!(
            state.reserved.len() <= self.max_reserved,
            "pool {} reserved {} instances with capacity {}",
            self.name,
            state.reserved.len(),
            self.max_reserved
        );
        self.metrics.lock().acquisitions += 1;
        Ok(checkout)
    }

    /// Move a reserved instance back into the available set.
    fn checkin(&self, id: InstanceId, mut value: T) -> Result<(), PoolError> {
        let mut state = self.state.lock();

        if !state.reserved.remove(&id) {
            drop(state);
            return Err(self.dispose_revoked(id, value));
        }

        if state.closed {
            drop(state);
            if let Err(err) = self.dispose_one(id, &mut value) {
                tracing::warn!(
                    pool = %self.name,
                    error = %err,
                    "failed to dispose instance released into closed pool"
                );
            }
            return Ok(());
        }

        debug_assert!(state.available.iter().all(|idle| idle.id != id));
        state.available.push(Idle {
            id,
            value,
            since: Instant::now(),
        });
        drop(state);

        self.released.notify_one();
        tracing::trace!(pool = %self.name, instance = %id, "instance released");
        Ok(())
    }

    /// Drop a reserved instance from the bookkeeping without disposing it.
    ///
    /// Returns `false` if a flush already revoked the reservation.
    fn forget(&self, id: InstanceId) -> bool {
        let removed = self.state.lock().reserved.remove(&id);
        if removed {
            self.released.notify_one();
            tracing::debug!(pool = %self.name, instance = %id, "instance detached from pool");
        }
        removed
    }

    /// Dispose an instance whose reservation was revoked by a flush.
    ///
    /// The returned error is `NotReserved`, or `Dispose` if disposal failed.
    fn dispose_revoked(&self, id: InstanceId, mut value: T) -> PoolError {
        tracing::warn!(
            pool = %self.name,
            instance = %id,
            "instance is no longer reserved, disposing"
        );
        match self.dispose_one(id, &mut value) {
            Ok(()) => PoolError::NotReserved { id },
            Err(err) => {
                tracing::warn!(
                    pool = %self.name,
                    error = %err,
                    "failed to dispose revoked instance"
                );
                err
            }
        }
    }

    fn dispose_one(&self, id: InstanceId, value: &mut T) -> Result<(), PoolError> {
        let result = value.dispose();

        let mut metrics = self.metrics.lock();
        match result {
            Ok(()) => {
                metrics.instances_disposed += 1;
                Ok(())
            }
            Err(source) => {
                metrics.dispose_failures += 1;
                Err(PoolError::Dispose { id, source })
            }
        }
    }

    fn dispose_all(&self, idle: Vec<Idle<T>>, revoked: usize) -> FlushReport {
        let mut report = FlushReport {
            disposed: 0,
            revoked,
            failures: Vec::new(),
        };

        for Idle { id, mut value, .. } in idle {
            match self.dispose_one(id, &mut value) {
                Ok(()) => report.disposed += 1,
                Err(err) => {
                    tracing::warn!(pool = %self.name, error = %err, "disposal failed");
                    report.failures.push(err);
                }
            }
        }

        report
    }
}

impl<T: Disposable> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Disposable> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish()
    }
}

/// Outcome of a flush.
#[derive(Debug, Default)]
#[must_use = "a flush report carries disposal failures"]
pub struct FlushReport {
    /// Available instances disposed successfully.
    pub disposed: usize,
    /// Reservations revoked. Those instances are disposed when released.
    pub revoked: usize,
    /// Disposal failures. The failing instances were removed regardless.
    pub failures: Vec<PoolError>,
}

impl FlushReport {
    /// Check if the flush removed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.disposed == 0 && self.revoked == 0 && self.failures.is_empty()
    }

    /// Check if every disposal succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: FlushReport) {
        self.disposed += other.disposed;
        self.revoked += other.revoked;
        self.failures.extend(other.failures);
    }

    /// Convert into a result, surfacing the first disposal failure.
    pub fn into_result(mut self) -> Result<usize, PoolError> {
        if self.failures.is_empty() {
            Ok(self.disposed)
        } else {
            Err(self.failures.swap_remove(0))
        }
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of instances available for reuse.
    pub available: usize,
    /// Number of instances currently checked out.
    pub reserved: usize,
    /// Number of callers blocked waiting for an instance.
    pub waiting: usize,
    /// Maximum allowed reserved instances.
    pub max_reserved: usize,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max_reserved == 0 {
            return 0.0;
        }
        (self.reserved as f64 / self.max_reserved as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.reserved >= self.max_reserved
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Instances constructed through the factory.
    pub instances_created: u64,
    /// Instances disposed successfully.
    pub instances_disposed: u64,
    /// Successful acquisitions, fresh or reused.
    pub acquisitions: u64,
    /// Acquisitions served from the available set.
    pub reuses: u64,
    /// Acquisitions that had to wait for a release.
    pub waits: u64,
    /// Acquisitions that gave up after their timeout.
    pub timeouts: u64,
    /// Factory calls that failed.
    pub factory_failures: u64,
    /// Disposals that failed.
    pub dispose_failures: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Fraction of acquisitions served by reuse (0.0 to 1.0).
    #[must_use]
    pub fn reuse_rate(&self) -> f64 {
        if self.acquisitions == 0 {
            return 0.0;
        }
        self.reuses as f64 / self.acquisitions as f64
    }

    /// Calculate acquisition success rate (0.0 to 1.0).
    #[must_use]
    pub fn acquire_success_rate(&self) -> f64 {
        let total = self.acquisitions + self.timeouts + self.factory_failures;
        if total == 0 {
            return 1.0;
        }
        self.acquisitions as f64 / total as f64
    }
}

/// An instance checked out of a [`Pool`].
///
/// The guard owns the instance while it is reserved and dereferences to it.
/// Call [`release`](Pooled::release) to return it; dropping the guard
/// releases it as well. Use [`detach`](Pooled::detach) to take the instance
/// out of the pool for good.
pub struct Pooled<T: Disposable> {
    id: InstanceId,
    /// Always `Some` until the guard is consumed.
    value: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T: Disposable> Pooled<T> {
    fn new(id: InstanceId, value: T, pool: Arc<PoolInner<T>>) -> Self {
        Self {
            id,
            value: Some(value),
            pool,
        }
    }

    /// Identifier of this instance within its pool.
    #[must_use]
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Check if the pool still lists this instance as reserved.
    ///
    /// Returns `false` once a flush has revoked the reservation.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.pool.state.lock().reserved.contains(&self.id)
    }

    /// Return the instance to its pool.
    ///
    /// Fails with [`PoolError::NotReserved`] if a flush revoked the
    /// reservation; the instance is disposed in that case and the pool's
    /// sets are left untouched. If that disposal fails the error is
    /// [`PoolError::Dispose`] instead.
    pub fn release(mut self) -> Result<(), PoolError> {
        let value = self.take_value();
        self.pool.checkin(self.id, value)
    }

    /// Remove the instance from the pool without disposing it.
    ///
    /// Its capacity slot is freed immediately. A flushed pool owns the
    /// disposal of every instance it held: if a flush revoked the
    /// reservation, the instance is disposed rather than handed out and the
    /// call fails the same way as [`release`](Pooled::release).
    pub fn detach(mut self) -> Result<T, PoolError> {
        let value = self.take_value();
        if self.pool.forget(self.id) {
            Ok(value)
        } else {
            Err(self.pool.dispose_revoked(self.id, value))
        }
    }

    fn take_value(&mut self) -> T {
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("pooled instance already taken"),
        }
    }
}

impl<T: Disposable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled instance already taken"),
        }
    }
}

impl<T: Disposable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled instance already taken"),
        }
    }
}

impl<T: Disposable + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("id", &self.id)
            .field("value", &self.value)
            .finish()
    }
}

impl<T: Disposable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            tracing::trace!(instance = %self.id, "returning dropped instance to pool");
            if let Err(err) = self.pool.checkin(self.id, value) {
                tracing::debug!(instance = %self.id, error = %err, "implicit release failed");
            }
        }
    }
}
