//! # data-objects-pool
//!
//! Keyed object pooling for driver-level resources such as connections and
//! prepared statements.
//!
//! Instances are reused instead of being constructed on every request. Each
//! pooling key owns an independent [`Pool`] that bounds the number of
//! concurrently *reserved* instances; callers block when a pool is exhausted
//! and resume as soon as another caller releases an instance.
//!
//! ## Features
//!
//! - Per-key pools created lazily by a [`PoolRegistry`]
//! - Capacity bound on reserved instances (default 4), idle instances unbounded
//! - Blocking, bounded-wait and non-blocking acquisition
//! - Explicit release with RAII fallback on drop
//! - Pool-wide and per-key flush with disposal of every instance
//! - Optional idle eviction and a background reaper task (`reaper` feature)
//!
//! ## Example
//!
//! ```rust
//! use data_objects_pool::{BoxError, Disposable, PoolRegistry, Poolable};
//!
//! struct Session {
//!     name: Option<String>,
//! }
//!
//! impl Disposable for Session {
//!     fn dispose(&mut self) -> Result<(), BoxError> {
//!         self.name = None;
//!         Ok(())
//!     }
//! }
//!
//! impl Poolable for Session {
//!     type Key = String;
//!     type Args = String;
//!
//!     fn pooling_key(args: &String) -> String {
//!         args.clone()
//!     }
//!
//!     fn create(args: &String) -> Result<Self, BoxError> {
//!         Ok(Session { name: Some(args.clone()) })
//!     }
//! }
//!
//! let registry = PoolRegistry::<Session>::new();
//!
//! let bob = registry.create(&"bob".to_string())?;
//! assert_eq!(bob.name.as_deref(), Some("bob"));
//!
//! let pool = registry.lookup(&"bob".to_string());
//! assert_eq!(pool.reserved_count(), 1);
//!
//! bob.release()?;
//! assert_eq!(pool.available_count(), 1);
//!
//! registry.flush();
//! assert_eq!(pool.available_count(), 0);
//! # Ok::<(), data_objects_pool::PoolError>(())
//! ```
//!
//! A type that does not implement [`Disposable`] cannot be pooled:
//!
//! ```compile_fail
//! use data_objects_pool::{BoxError, PoolRegistry, Poolable};
//!
//! struct Durian;
//!
//! impl Poolable for Durian {
//!     type Key = ();
//!     type Args = ();
//!
//!     fn pooling_key(_: &()) {}
//!
//!     fn create(_: &()) -> Result<Self, BoxError> {
//!         Ok(Durian)
//!     }
//! }
//!
//! let registry = PoolRegistry::<Durian>::new();
//! let _durian = registry.create(&());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod pool;
#[cfg(feature = "reaper")]
pub mod reaper;
pub mod registry;

// Configuration
pub use config::{DEFAULT_MAX_RESERVED, PoolConfig};

// Error types
pub use error::{BoxError, PoolError};

// Construction
pub use factory::PoolEntryFactory;

// Lifecycle management
pub use lifecycle::{Disposable, InstanceId, Poolable};

// Pool types
pub use pool::{FlushReport, Pool, PoolMetrics, PoolStatus, Pooled};

// Registry
pub use registry::{PoolRegistry, PoolRegistryBuilder};

#[cfg(feature = "reaper")]
pub use reaper::IdleReaper;
