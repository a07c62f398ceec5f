//! Error types for the object pool

use std::time::Duration;
use thiserror::Error;

/// Reasons an acquire can come back empty, or a pool can fail to build.
///
/// None of these are fatal. The `Option`-returning entry points
/// (`acquire`, `acquire_async`) collapse all of them to `None`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Maximum live objects limit reached ({limit})")]
    Exhausted { limit: usize },

    #[error("Pool is empty and no factory is configured")]
    NoFactory,

    #[error("Factory failed to construct an object")]
    FactoryFailed,

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Idle eviction requires a running tokio runtime")]
    NoRuntime,
}

pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            PoolError::Exhausted { limit: 4 }.to_string(),
            "Maximum live objects limit reached (4)"
        );
        assert!(PoolError::Timeout(Duration::from_millis(5)).to_string().contains("5ms"));
    }
}
