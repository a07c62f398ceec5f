//! Metrics collection and export for object pools

use crate::errors::{PoolError, PoolResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics snapshot for a pool
///
/// Counters are read independently, so a snapshot taken under load is
/// approximate in the same way [`ShardedPool::len`](crate::ShardedPool::len) is.
///
/// # Examples
///
/// ```
/// use hyperpool::{Lifecycle, PoolConfiguration, ShardedPool};
///
/// let pool = ShardedPool::new(
///     Lifecycle::new().with_factory(|| 0u64),
///     PoolConfiguration::new().without_idle_eviction(),
/// )
/// .unwrap();
///
/// let value = pool.acquire(None).unwrap();
/// pool.release(value);
///
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.created, 1);
/// assert_eq!(metrics.returned, 1);
/// assert_eq!(metrics.pooled_objects, 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Acquires served from the local shard
    pub hits: usize,

    /// Acquires served by stealing from another shard
    pub steals: usize,

    /// Objects constructed by the factory
    pub created: usize,

    /// Factory calls that returned nothing
    pub factory_failures: usize,

    /// Acquires refused because the live-object limit was reached
    pub exhausted_events: usize,

    /// Waits that ended without an object
    pub timeouts: usize,

    /// Releases that were cached
    pub returned: usize,

    /// Releases destroyed because storage was full or draining
    pub discarded: usize,

    /// Objects passed to the destructor for any reason
    pub destroyed: usize,

    /// Completed drains
    pub drains: usize,

    /// Objects cached right now
    pub pooled_objects: usize,

    /// Objects constructed and not yet destroyed
    pub outstanding_objects: usize,

    /// Live-object limit, if any
    pub limit: Option<usize>,

    /// `outstanding / limit`, or 0.0 without a limit
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("hits".to_string(), self.hits.to_string());
        metrics.insert("steals".to_string(), self.steals.to_string());
        metrics.insert("created".to_string(), self.created.to_string());
        metrics.insert("factory_failures".to_string(), self.factory_failures.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("timeouts".to_string(), self.timeouts.to_string());
        metrics.insert("returned".to_string(), self.returned.to_string());
        metrics.insert("discarded".to_string(), self.discarded.to_string());
        metrics.insert("destroyed".to_string(), self.destroyed.to_string());
        metrics.insert("drains".to_string(), self.drains.to_string());
        metrics.insert("pooled_objects".to_string(), self.pooled_objects.to_string());
        metrics.insert("outstanding_objects".to_string(), self.outstanding_objects.to_string());
        metrics.insert(
            "limit".to_string(),
            self.limit.map_or_else(|| "unbounded".to_string(), |l| l.to_string()),
        );
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use hyperpool::{Lifecycle, PoolConfiguration, ShardedPool};
    /// use std::collections::HashMap;
    ///
    /// let pool = ShardedPool::new(
    ///     Lifecycle::new().with_factory(|| 0u8),
    ///     PoolConfiguration::new().without_idle_eviction(),
    /// )
    /// .unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("buffers", Some(&tags));
    /// assert!(output.contains("hyperpool_objects_outstanding"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        let gauges = [
            ("hyperpool_objects_pooled", "Objects currently cached", metrics.pooled_objects as f64),
            (
                "hyperpool_objects_outstanding",
                "Objects constructed and not yet destroyed",
                metrics.outstanding_objects as f64,
            ),
            ("hyperpool_utilization", "Outstanding objects relative to the limit", metrics.utilization),
        ];
        for (name, help, value) in gauges {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} gauge\n"));
            output.push_str(&format!("{name}{{{labels}}} {value}\n"));
        }

        let counters = [
            ("hyperpool_hits_total", "Acquires served from the local shard", metrics.hits),
            ("hyperpool_steals_total", "Acquires served from another shard", metrics.steals),
            ("hyperpool_created_total", "Objects constructed by the factory", metrics.created),
            ("hyperpool_factory_failures_total", "Failed factory calls", metrics.factory_failures),
            ("hyperpool_exhausted_total", "Acquires refused at the limit", metrics.exhausted_events),
            ("hyperpool_timeouts_total", "Waits that ended empty", metrics.timeouts),
            ("hyperpool_returned_total", "Releases cached", metrics.returned),
            ("hyperpool_discarded_total", "Releases destroyed instead of cached", metrics.discarded),
            ("hyperpool_destroyed_total", "Objects passed to the destructor", metrics.destroyed),
            ("hyperpool_drains_total", "Completed drains", metrics.drains),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name}{{{labels}}} {value}\n"));
        }

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Pool-wide counters for the slow paths. Hot-path counters live in the shards.
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub steals: AtomicUsize,
    pub created: AtomicUsize,
    pub factory_failures: AtomicUsize,
    pub exhausted_events: AtomicUsize,
    pub timeouts: AtomicUsize,
    pub discarded: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub drains: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_create<T>(&self, result: &PoolResult<T>) {
        match result {
            Ok(_) => Self::incr(&self.created),
            Err(PoolError::Exhausted { .. }) => Self::incr(&self.exhausted_events),
            Err(PoolError::FactoryFailed) => Self::incr(&self.factory_failures),
            Err(_) => {}
        }
    }

    pub fn snapshot(
        &self,
        hits: usize,
        returned: usize,
        pooled: usize,
        outstanding: usize,
        limit: Option<usize>,
    ) -> PoolMetrics {
        PoolMetrics {
            hits,
            steals: self.steals.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            factory_failures: self.factory_failures.load(Ordering::Relaxed),
            exhausted_events: self.exhausted_events.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            returned,
            discarded: self.discarded.load(Ordering::Relaxed),
            destroyed: self.destroyed.load(Ordering::Relaxed),
            drains: self.drains.load(Ordering::Relaxed),
            pooled_objects: pooled,
            outstanding_objects: outstanding,
            limit,
            utilization: utilization(outstanding, limit),
        }
    }
}

pub(crate) fn utilization(outstanding: usize, limit: Option<usize>) -> f64 {
    match limit {
        Some(limit) if limit > 0 => outstanding as f64 / limit as f64,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_utilization() {
        let tracker = MetricsTracker::new();
        MetricsTracker::incr(&tracker.created);
        for _ in 0..3 {
            MetricsTracker::incr(&tracker.destroyed);
        }
        let metrics = tracker.snapshot(5, 2, 1, 3, Some(4));
        assert_eq!(metrics.created, 1);
        assert_eq!(metrics.destroyed, 3);
        assert_eq!(metrics.hits, 5);
        assert!((metrics.utilization - 0.75).abs() < f64::EPSILON);
        assert_eq!(tracker.snapshot(0, 0, 0, 3, None).utilization, 0.0);
    }

    #[test]
    fn test_export_keys() {
        let metrics = MetricsTracker::new().snapshot(0, 0, 0, 0, None);
        let exported = metrics.export();
        assert_eq!(exported.get("limit").map(String::as_str), Some("unbounded"));
        assert_eq!(exported.get("utilization").map(String::as_str), Some("0.00"));
    }

    #[test]
    fn test_prometheus_labels_sorted() {
        let metrics = MetricsTracker::new().snapshot(1, 0, 0, 0, None);
        let mut tags = HashMap::new();
        tags.insert("zone".to_string(), "b".to_string());
        tags.insert("app".to_string(), "a".to_string());
        let output = MetricsExporter::export_prometheus(&metrics, "p", Some(&tags));
        assert!(output.contains("hyperpool_hits_total{pool=\"p\",app=\"a\",zone=\"b\"} 1"));
        assert!(output.contains("# TYPE hyperpool_objects_pooled gauge"));
    }
}
