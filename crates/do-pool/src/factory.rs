//! Construction of new pool entries.

use crate::error::BoxError;

/// Constructs a fresh instance when a pool has nothing to reuse.
///
/// Implemented for every closure `Fn(&A) -> Result<T, E>`, so both closures
/// and constructor functions such as [`Poolable::create`] can be passed to
/// [`Pool::acquire`] directly.
///
/// [`Poolable::create`]: crate::Poolable::create
/// [`Pool::acquire`]: crate::Pool::acquire
pub trait PoolEntryFactory<A: ?Sized, T> {
    /// Construct a new instance from the original arguments.
    fn create(&self, args: &A) -> Result<T, BoxError>;
}

impl<A, T, E, F> PoolEntryFactory<A, T> for F
where
    A: ?Sized,
    E: Into<BoxError>,
    F: Fn(&A) -> Result<T, E>,
{
    fn create(&self, args: &A) -> Result<T, BoxError> {
        self(args).map_err(Into::into)
    }
}
