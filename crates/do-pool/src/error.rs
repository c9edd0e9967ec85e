//! Pool error types.

use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::InstanceId;

/// Boxed error used for failures raised by pooled types themselves.
///
/// Factories and disposal operations belong to the adopting type, so the pool
/// carries their errors opaquely.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Timed out waiting for an instance to be released.
    #[error("timed out after {waited:?} waiting for a pooled instance")]
    AcquireTimeout {
        /// How long the caller waited before giving up.
        waited: Duration,
    },

    /// The pool has been closed.
    #[error("pool is closed")]
    PoolClosed,

    /// An instance was released that the pool does not list as reserved.
    #[error("instance {id} is not reserved by this pool")]
    NotReserved {
        /// Identifier of the released instance.
        id: InstanceId,
    },

    /// The factory failed to construct a new instance.
    #[error("failed to construct pooled instance: {0}")]
    Factory(#[source] BoxError),

    /// An instance failed to dispose itself.
    #[error("failed to dispose instance {id}: {source}")]
    Dispose {
        /// Identifier of the instance being disposed.
        id: InstanceId,
        /// Error reported by the instance.
        #[source]
        source: BoxError,
    },

    /// Invalid pool configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PoolError {
    /// Check if this error is transient and the operation may succeed later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::AcquireTimeout { .. } | Self::Factory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoolError::NotReserved {
            id: InstanceId::new(7),
        };
        assert_eq!(err.to_string(), "instance #7 is not reserved by this pool");

        let err = PoolError::AcquireTimeout {
            waited: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "timed out after 250ms waiting for a pooled instance"
        );
    }

    #[test]
    fn test_error_source_is_preserved() {
        let err = PoolError::Factory("connection refused".into());
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(
            PoolError::AcquireTimeout {
                waited: Duration::from_secs(1)
            }
            .is_transient()
        );
        assert!(!PoolError::PoolClosed.is_transient());
        assert!(!PoolError::Config("bad".into()).is_transient());
    }
}
