//! Bounded-queue pool with a release timer
//!
//! A single `ArrayQueue` of capacity `max_conn` replaces the shards, and
//! `max_conn` doubles as the live-object limit. This trades shard locality for
//! strict global accounting, which suits pooled network connections.
//!
//! Every release that lands in the queue re-arms a timer. When it fires (`release_after` without a
//! release) the queue is drained through the destructor and `max_keep` fresh
//! objects are built, after which the timer stays quiet until the next release.

use crate::config::BoundedConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{ControllerHandle, DrainReport};
use crate::gate::DrainGate;
use crate::lifecycle::{Lifecycle, Tracker};
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::pool::{PooledObject, Recycle};
use crate::waiters::Waiters;

use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

// `last_release` value before the first release.
const NEVER: u64 = 0;

struct BoundedInner<T> {
    queue: ArrayQueue<T>,
    tracker: Tracker<T>,
    gate: DrainGate,
    waiters: Waiters,
    epoch: Instant,
    // Milliseconds since `epoch`, plus one so that zero can mean NEVER.
    last_release: CachePadded<AtomicU64>,
    hits: AtomicUsize,
    returned: AtomicUsize,
    metrics: MetricsTracker,
    max_keep: usize,
}

impl<T: Send + 'static> BoundedInner<T> {
    fn pop(&self) -> Option<T> {
        if self.gate.is_draining() {
            return None;
        }
        let value = self.queue.pop()?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    fn create(&self) -> PoolResult<T> {
        let result = self.tracker.create();
        self.metrics.record_create(&result);
        result
    }

    /// Factory call at the end of a wait that dequeued nothing.
    fn create_after_wait(&self, wait: Duration) -> PoolResult<T> {
        self.create().map_err(|err| match err {
            PoolError::Exhausted { .. } | PoolError::NoFactory => {
                MetricsTracker::incr(&self.metrics.timeouts);
                PoolError::Timeout(wait)
            }
            other => other,
        })
    }

    // Dequeue, then a dequeue bounded by `wait`, then the factory: a timed
    // acquire takes a connection that is about to come back over a new one.
    fn get(&self, wait: Option<Duration>) -> PoolResult<T> {
        if let Some(value) = self.pop() {
            return Ok(value);
        }
        let Some(wait) = wait.filter(|wait| !wait.is_zero()) else {
            return self.create();
        };
        match self.waiters.wait_blocking(wait, || self.pop()) {
            Some(value) => Ok(value),
            None => self.create_after_wait(wait),
        }
    }

    async fn get_async(&self, wait: Option<Duration>) -> PoolResult<T> {
        if let Some(value) = self.pop() {
            return Ok(value);
        }
        let Some(wait) = wait.filter(|wait| !wait.is_zero()) else {
            return self.create();
        };
        match self.waiters.wait(wait, || self.pop()).await {
            Some(value) => Ok(value),
            None => self.create_after_wait(wait),
        }
    }

    fn release(&self, value: T) {
        let rejected = match self.gate.enter() {
            Some(_deposit) => match self.queue.push(value) {
                Ok(()) => {
                    self.returned.fetch_add(1, Ordering::Relaxed);
                    self.touch_release();
                    None
                }
                Err(value) => Some(value),
            },
            None => Some(value),
        };
        if let Some(value) = rejected {
            self.discard_value(value);
        }
        self.waiters.wake();
    }

    fn touch_release(&self) {
        let millis = self.epoch.elapsed().as_millis() as u64;
        self.last_release.store(millis + 1, Ordering::Release);
    }

    fn last_release_at(&self, stamp: u64) -> Instant {
        self.epoch + Duration::from_millis(stamp.saturating_sub(1))
    }

    fn discard_value(&self, value: T) {
        MetricsTracker::incr(&self.metrics.discarded);
        self.destroy(value);
    }

    fn destroy(&self, value: T) {
        self.tracker.destroy(value);
        MetricsTracker::incr(&self.metrics.destroyed);
    }

    fn drain_with(&self, keep: usize) -> Option<DrainReport> {
        let _drain = self.gate.begin_drain()?;

        let mut destroyed = 0;
        while let Some(value) = self.queue.pop() {
            self.destroy(value);
            destroyed += 1;
        }

        let mut prewarmed = 0;
        for _ in 0..keep {
            match self.create() {
                Ok(value) => match self.queue.push(value) {
                    Ok(()) => prewarmed += 1,
                    Err(value) => self.discard_value(value),
                },
                Err(err) => {
                    tracing::warn!(error = %err, "refill after drain stopped early");
                    break;
                }
            }
        }

        MetricsTracker::incr(&self.metrics.drains);
        Some(DrainReport {
            destroyed,
            prewarmed,
        })
    }

    fn get_metrics(&self) -> PoolMetrics {
        self.metrics.snapshot(
            self.hits.load(Ordering::Relaxed),
            self.returned.load(Ordering::Relaxed),
            self.queue.len(),
            self.tracker.outstanding(),
            self.tracker.limit(),
        )
    }
}

impl<T: Send + 'static> Recycle<T> for BoundedInner<T> {
    fn recycle(&self, value: T) {
        self.release(value);
    }

    fn discard(&self, value: T) {
        self.discard_value(value);
        self.waiters.wake();
    }
}

impl<T> Drop for BoundedInner<T> {
    fn drop(&mut self) {
        while let Some(value) = self.queue.pop() {
            self.tracker.destroy(value);
        }
    }
}

async fn run_release_timer<T: Send + 'static>(
    target: Weak<BoundedInner<T>>,
    after: Duration,
    shutdown: Arc<Notify>,
) {
    let mut handled = NEVER;
    tracing::debug!(?after, "release timer started");

    loop {
        let deadline = {
            let Some(pool) = target.upgrade() else {
                break;
            };
            let stamp = pool.last_release.load(Ordering::Acquire);
            if stamp == handled {
                Instant::now() + after
            } else {
                pool.last_release_at(stamp) + after
            }
        };

        tokio::select! {
            _ = shutdown.notified() => break,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        let Some(pool) = target.upgrade() else {
            break;
        };
        let stamp = pool.last_release.load(Ordering::Acquire);
        // Nothing released since the last drain, or the timer was re-armed.
        if stamp == handled || Instant::now() < pool.last_release_at(stamp) + after {
            continue;
        }
        if let Some(report) = pool.drain_with(pool.max_keep) {
            tracing::debug!(
                destroyed = report.destroyed,
                prewarmed = report.prewarmed,
                "release timer drained pool"
            );
        }
        handled = stamp;
    }

    tracing::debug!("release timer stopped");
}

/// Pool backed by one bounded queue, for strict global capacity accounting
///
/// # Examples
///
/// ```
/// use hyperpool::{BoundedConfiguration, BoundedPool, Lifecycle};
///
/// let pool = BoundedPool::new(
///     Lifecycle::new().with_factory(|| String::from("conn")),
///     BoundedConfiguration::new().with_max_conn(2).without_release_timer(),
/// )
/// .unwrap();
///
/// let a = pool.acquire(None).unwrap();
/// let b = pool.acquire(None).unwrap();
/// assert!(pool.acquire(None).is_none());
///
/// pool.release(a);
/// pool.release(b);
/// assert_eq!(pool.len(), 2);
/// ```
pub struct BoundedPool<T: Send + 'static> {
    inner: Arc<BoundedInner<T>>,
    timer: Option<ControllerHandle>,
}

impl<T: Send + 'static> BoundedPool<T> {
    /// Build a pool; spawns the release timer on the current tokio runtime
    /// when `release_after` is set.
    pub fn new(lifecycle: Lifecycle<T>, config: BoundedConfiguration) -> PoolResult<Self> {
        config.validate()?;

        let inner = Arc::new(BoundedInner {
            queue: ArrayQueue::new(config.max_conn),
            tracker: Tracker::new(lifecycle, Some(config.max_conn)),
            gate: DrainGate::new(),
            waiters: Waiters::new(),
            epoch: Instant::now(),
            last_release: CachePadded::new(AtomicU64::new(NEVER)),
            hits: AtomicUsize::new(0),
            returned: AtomicUsize::new(0),
            metrics: MetricsTracker::new(),
            max_keep: config.max_keep,
        });

        let timer = match config.release_after {
            Some(after) => {
                let target = Arc::downgrade(&inner);
                Some(ControllerHandle::spawn(|shutdown| {
                    run_release_timer(target, after, shutdown)
                })?)
            }
            None => None,
        };

        Ok(Self { inner, timer })
    }

    /// Acquire an object, reporting why none was available.
    ///
    /// With a non-zero `wait` and an empty queue, blocks for up to `wait` for
    /// a released object before falling back to the factory. Without a wait
    /// the factory is called straight away.
    pub fn get(&self, wait: Option<Duration>) -> PoolResult<T> {
        self.inner.get(wait)
    }

    pub fn acquire(&self, wait: Option<Duration>) -> Option<T> {
        self.get(wait).ok()
    }

    pub async fn get_async(&self, wait: Option<Duration>) -> PoolResult<T> {
        self.inner.get_async(wait).await
    }

    pub async fn acquire_async(&self, wait: Option<Duration>) -> Option<T> {
        self.get_async(wait).await.ok()
    }

    pub fn get_object(&self, wait: Option<Duration>) -> PoolResult<PooledObject<T>> {
        let value = self.get(wait)?;
        Ok(PooledObject::new(value, self.recycler()))
    }

    pub async fn get_object_async(&self, wait: Option<Duration>) -> PoolResult<PooledObject<T>> {
        let value = self.get_async(wait).await?;
        Ok(PooledObject::new(value, self.recycler()))
    }

    /// Return an object; `None` is ignored. Re-arms the release timer.
    pub fn release(&self, value: impl Into<Option<T>>) {
        if let Some(value) = value.into() {
            self.inner.release(value);
        }
    }

    pub fn discard(&self, value: T) {
        Recycle::discard(&*self.inner, value);
    }

    /// Drain the queue and refill `max_keep` objects now.
    pub fn drain(&self) -> Option<DrainReport> {
        self.inner.drain_with(self.inner.max_keep)
    }

    /// Stop the release timer and destroy every queued object.
    pub async fn shutdown(mut self) -> DrainReport {
        if let Some(timer) = self.timer.take() {
            timer.stop().await;
        }
        self.inner.drain_with(0).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.is_empty()
    }

    pub fn outstanding(&self) -> usize {
        self.inner.tracker.outstanding()
    }

    pub fn capacity(&self) -> usize {
        self.inner.queue.capacity()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.gate.is_draining()
    }

    pub fn get_metrics(&self) -> PoolMetrics {
        self.inner.get_metrics()
    }

    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    fn recycler(&self) -> Arc<dyn Recycle<T>> {
        Arc::clone(&self.inner) as Arc<dyn Recycle<T>>
    }
}
