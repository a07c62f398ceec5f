//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Configuration for the sharded pool
///
/// # Examples
///
/// ```
/// use hyperpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_shard_count(4)
///     .with_limit(64)
///     .with_idle_threshold(Duration::from_secs(30))
///     .with_prewarm(2);
///
/// assert_eq!(config.shard_count, 4);
/// assert_eq!(config.limit, Some(64));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfiguration {
    /// Number of independently synchronized shards
    pub shard_count: usize,

    /// Maximum objects kept in one shard's overflow stack (the fast slot is extra)
    pub shard_capacity: usize,

    /// Maximum number of live objects the pool will construct
    pub limit: Option<usize>,

    /// Period of the idle-eviction controller
    pub tick_interval: Duration,

    /// Consecutive idle ticks required before draining
    pub check_limit: u32,

    /// Minimum idle time before draining; `None` disables idle eviction
    pub idle_threshold: Option<Duration>,

    /// Objects recreated after each drain
    pub prewarm_count: usize,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
            shard_capacity: 8,
            limit: None,
            tick_interval: Duration::from_secs(10),
            check_limit: 3,
            idle_threshold: Some(Duration::from_secs(120)),
            prewarm_count: 0,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of shards
    pub fn with_shard_count(mut self, count: usize) -> Self {
        self.shard_count = count;
        self
    }

    /// Set the per-shard overflow cap
    ///
    /// # Examples
    ///
    /// ```
    /// use hyperpool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_shard_capacity(0);
    /// assert_eq!(config.shard_capacity, 0);
    /// ```
    pub fn with_shard_capacity(mut self, capacity: usize) -> Self {
        self.shard_capacity = capacity;
        self
    }

    /// Cap the number of concurrently live objects
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Set the controller tick period
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the number of consecutive idle ticks before a drain
    pub fn with_check_limit(mut self, ticks: u32) -> Self {
        self.check_limit = ticks;
        self
    }

    /// Set the idle threshold and enable idle eviction
    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = Some(threshold);
        self
    }

    /// Disable the idle-eviction controller
    pub fn without_idle_eviction(mut self) -> Self {
        self.idle_threshold = None;
        self
    }

    /// Set the number of objects recreated after a drain
    pub fn with_prewarm(mut self, count: usize) -> Self {
        self.prewarm_count = count;
        self
    }

    /// Check the configuration for values the pool cannot run with
    ///
    /// # Examples
    ///
    /// ```
    /// use hyperpool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_shard_count(0);
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> PoolResult<()> {
        if self.shard_count == 0 {
            return Err(invalid("shard_count must be at least 1"));
        }
        if self.idle_threshold.is_some() {
            if self.tick_interval.is_zero() {
                return Err(invalid("tick_interval must be non-zero"));
            }
            if self.check_limit == 0 {
                return Err(invalid("check_limit must be at least 1"));
            }
        }
        if let Some(limit) = self.limit
            && self.prewarm_count > limit
        {
            return Err(invalid(format!(
                "prewarm_count ({}) exceeds limit ({})",
                self.prewarm_count, limit
            )));
        }
        Ok(())
    }
}

/// Configuration for the bounded-queue pool
///
/// # Examples
///
/// ```
/// use hyperpool::BoundedConfiguration;
/// use std::time::Duration;
///
/// let config = BoundedConfiguration::new()
///     .with_max_conn(16)
///     .with_release_after(Duration::from_secs(60))
///     .with_max_keep(4);
///
/// assert_eq!(config.max_conn, 16);
/// assert_eq!(config.max_keep, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedConfiguration {
    /// Queue capacity, also the maximum number of live objects
    pub max_conn: usize,

    /// Quiet period after the last release before the queue is drained
    pub release_after: Option<Duration>,

    /// Objects recreated after a drain
    pub max_keep: usize,
}

impl Default for BoundedConfiguration {
    fn default() -> Self {
        Self {
            max_conn: 64,
            release_after: Some(Duration::from_secs(120)),
            max_keep: 2,
        }
    }
}

impl BoundedConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_conn(mut self, max_conn: usize) -> Self {
        self.max_conn = max_conn;
        self
    }

    pub fn with_release_after(mut self, after: Duration) -> Self {
        self.release_after = Some(after);
        self
    }

    /// Disable the release timer
    pub fn without_release_timer(mut self) -> Self {
        self.release_after = None;
        self
    }

    pub fn with_max_keep(mut self, keep: usize) -> Self {
        self.max_keep = keep;
        self
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.max_conn == 0 {
            return Err(invalid("max_conn must be at least 1"));
        }
        if self.max_keep > self.max_conn {
            return Err(invalid(format!(
                "max_keep ({}) exceeds max_conn ({})",
                self.max_keep, self.max_conn
            )));
        }
        if matches!(self.release_after, Some(after) if after.is_zero()) {
            return Err(invalid("release_after must be non-zero"));
        }
        Ok(())
    }
}

fn default_shard_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn invalid(reason: impl Into<String>) -> PoolError {
    PoolError::InvalidConfiguration(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfiguration::default();
        assert!(config.shard_count >= 1);
        assert_eq!(config.tick_interval, Duration::from_secs(10));
        assert_eq!(config.check_limit, 3);
        assert_eq!(config.idle_threshold, Some(Duration::from_secs(120)));
        assert!(config.validate().is_ok());

        let bounded = BoundedConfiguration::default();
        assert_eq!(bounded.release_after, Some(Duration::from_secs(120)));
        assert_eq!(bounded.max_keep, 2);
        assert!(bounded.validate().is_ok());
    }

    #[test]
    fn test_zero_limit_means_unbounded() {
        let config = PoolConfiguration::new().with_limit(0);
        assert_eq!(config.limit, None);
    }

    #[test]
    fn test_prewarm_over_limit_rejected() {
        let config = PoolConfiguration::new().with_limit(2).with_prewarm(3);
        assert!(matches!(
            config.validate(),
            Err(PoolError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_eviction_settings_ignored_when_disabled() {
        let config = PoolConfiguration::new()
            .with_check_limit(0)
            .without_idle_eviction();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bounded_validation() {
        assert!(BoundedConfiguration::new().with_max_conn(0).validate().is_err());
        assert!(
            BoundedConfiguration::new()
                .with_max_conn(1)
                .with_max_keep(2)
                .validate()
                .is_err()
        );
        assert!(
            BoundedConfiguration::new()
                .with_release_after(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
