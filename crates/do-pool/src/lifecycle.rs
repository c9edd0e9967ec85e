//! Lifecycle contracts for pooled types.
//!
//! A pooled instance moves through a fixed set of states:
//!
//! ```text
//! construct -> Reserved -> release -> Available -> acquire -> Reserved
//!                  |                      |
//!                  +------- flush --------+--> disposed
//! ```
//!
//! Disposal is terminal. A disposed instance never re-enters a pool.

use std::fmt;
use std::hash::Hash;

use crate::config::DEFAULT_MAX_RESERVED;
use crate::error::BoxError;

/// A resource that must be cleaned up when it is permanently removed from a pool.
///
/// Every pooled type implements this trait. The pool calls [`dispose`] exactly
/// once per instance: when a flush or idle eviction removes an available
/// instance, or when a revoked reservation is released.
///
/// [`dispose`]: Disposable::dispose
pub trait Disposable: Send + 'static {
    /// Release any resources held by this instance.
    ///
    /// Failures are reported to the caller of the flush but never cause the
    /// pool to keep the instance.
    fn dispose(&mut self) -> Result<(), BoxError>;
}

/// A type whose construction is routed through a [`PoolRegistry`].
///
/// The registry derives a key from the construction arguments, resolves the
/// pool for that key and either reuses an available instance or calls
/// [`create`](Poolable::create).
///
/// # Example
///
/// ```rust
/// use data_objects_pool::{BoxError, Disposable, Poolable};
///
/// struct Statement {
///     sql: String,
/// }
///
/// impl Disposable for Statement {
///     fn dispose(&mut self) -> Result<(), BoxError> {
///         self.sql.clear();
///         Ok(())
///     }
/// }
///
/// impl Poolable for Statement {
///     type Key = String;
///     type Args = (String, u32);
///     const MAX_RESERVED: usize = 8;
///
///     fn pooling_key(args: &(String, u32)) -> String {
///         args.0.clone()
///     }
///
///     fn create(args: &(String, u32)) -> Result<Self, BoxError> {
///         Ok(Statement { sql: args.0.clone() })
///     }
/// }
/// ```
///
/// [`PoolRegistry`]: crate::PoolRegistry
pub trait Poolable: Disposable + Sized {
    /// Key partitioning instances into independent pools.
    type Key: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static;

    /// Arguments accepted by the constructor.
    type Args;

    /// Default capacity of every pool of this type.
    const MAX_RESERVED: usize = DEFAULT_MAX_RESERVED;

    /// Derive the pooling key from construction arguments.
    ///
    /// Must be a pure function of `args`.
    fn pooling_key(args: &Self::Args) -> Self::Key;

    /// Construct a fresh instance exactly as if pooling were absent.
    fn create(args: &Self::Args) -> Result<Self, BoxError>;
}

/// Identifier of a pooled instance, unique within its pool and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Create an identifier from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which set of its pool an instance currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Checked out by exactly one caller and counted against capacity.
    Reserved,
    /// Checked in and eligible for reuse.
    Available,
}

impl InstanceState {
    /// Check if the instance is checked out.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sample;

    impl Disposable for Sample {
        fn dispose(&mut self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    impl Poolable for Sample {
        type Key = u8;
        type Args = (u8, &'static str);

        fn pooling_key(args: &Self::Args) -> u8 {
            args.0
        }

        fn create(_: &Self::Args) -> Result<Self, BoxError> {
            Ok(Sample)
        }
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(Sample::MAX_RESERVED, DEFAULT_MAX_RESERVED);
    }

    #[test]
    fn test_pooling_key_uses_first_argument() {
        assert_eq!(Sample::pooling_key(&(3, "ignored")), 3);
        assert_eq!(
            Sample::pooling_key(&(3, "a")),
            Sample::pooling_key(&(3, "b"))
        );
    }

    #[test]
    fn test_instance_id_display() {
        let id = InstanceId::new(42);
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "#42");
    }

    #[test]
    fn test_instance_state() {
        assert!(InstanceState::Reserved.is_reserved());
        assert!(!InstanceState::Available.is_reserved());
    }
}
