//! Health monitoring for object pools

use crate::eviction::EvictionState;
use crate::metrics::utilization;

/// Health status of a pool
///
/// # Examples
///
/// ```
/// use hyperpool::{Lifecycle, PoolConfiguration, ShardedPool};
///
/// let pool = ShardedPool::new(
///     Lifecycle::new().with_factory(|| 1u32),
///     PoolConfiguration::new().with_limit(10).without_idle_eviction(),
/// )
/// .unwrap();
///
/// let health = pool.get_health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.outstanding_objects, 0);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Outstanding objects relative to the limit (0.0 to 1.0, 0.0 without a limit)
    pub utilization: f64,

    /// Objects currently cached
    pub pooled_objects: usize,

    /// Objects constructed and not yet destroyed
    pub outstanding_objects: usize,

    /// Live-object limit
    pub limit: Option<usize>,

    /// Idle-eviction controller state
    pub eviction_state: EvictionState,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub fn new(
        pooled: usize,
        outstanding: usize,
        limit: Option<usize>,
        eviction_state: EvictionState,
    ) -> Self {
        let utilization = utilization(outstanding, limit);

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if eviction_state == EvictionState::Draining {
            warnings.push("Pool is draining".to_string());
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            pooled_objects: pooled,
            outstanding_objects: outstanding,
            limit,
            eviction_state,
            warnings,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturated_pool_is_unhealthy() {
        let health = HealthStatus::new(0, 10, Some(10), EvictionState::Idle);
        assert!(!health.is_healthy());
        assert_eq!(health.warning_count, 1);
    }

    #[test]
    fn test_draining_is_a_warning_only() {
        let health = HealthStatus::new(3, 3, None, EvictionState::Draining);
        assert!(health.is_healthy());
        assert_eq!(health.warnings, vec!["Pool is draining".to_string()]);
    }
}
