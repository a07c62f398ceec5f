//! Sharded object pool

use crate::config::PoolConfiguration;
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{
    ControllerHandle, DrainReport, EvictionState, IdleDetector, IdleTarget, StateCell,
    run_idle_controller,
};
use crate::gate::DrainGate;
use crate::health::HealthStatus;
use crate::lifecycle::{Lifecycle, Tracker};
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::selector::ShardSelector;
use crate::shard::Shard;
use crate::waiters::{Waiters, wait_budget};

use crossbeam::utils::CachePadded;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Where a [`PooledObject`] goes back to.
pub(crate) trait Recycle<T>: Send + Sync {
    fn recycle(&self, value: T);

    fn discard(&self, value: T);
}

/// A pooled object that is released back to its pool when dropped
pub struct PooledObject<T> {
    value: Option<T>,
    pool: Arc<dyn Recycle<T>>,
}

impl<T> PooledObject<T> {
    pub(crate) fn new(value: T, pool: Arc<dyn Recycle<T>>) -> Self {
        Self {
            value: Some(value),
            pool,
        }
    }

    /// Take the inner value without returning it to the pool.
    ///
    /// The object keeps counting toward the pool's limit until it is handed
    /// back with `release` or `discard`.
    pub fn detach(mut self) -> T {
        self.value.take().expect("Value already taken")
    }

    /// Destroy the object instead of caching it, e.g. after a failed health check.
    pub fn discard(mut self) {
        if let Some(value) = self.value.take() {
            self.pool.discard(value);
        }
    }
}

impl<T> Deref for PooledObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already taken")
    }
}

impl<T> DerefMut for PooledObject<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already taken")
    }
}

impl<T> Drop for PooledObject<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.recycle(value);
        }
    }
}

struct Inner<T> {
    shards: Box<[CachePadded<Shard<T>>]>,
    selector: ShardSelector,
    tracker: Tracker<T>,
    gate: DrainGate,
    waiters: Waiters,
    activity: CachePadded<AtomicBool>,
    state: StateCell,
    metrics: MetricsTracker,
    prewarm_count: usize,
}

impl<T: Send + 'static> Inner<T> {
    // Read-mostly: only written when the controller has cleared it.
    #[inline]
    fn mark_active(&self) {
        if !self.activity.load(Ordering::Relaxed) {
            self.activity.store(true, Ordering::Relaxed);
        }
    }

    /// Local shard first, then one steal attempt per foreign shard.
    fn take_cached(&self) -> Option<T> {
        if self.gate.is_draining() {
            return None;
        }
        let count = self.shards.len();
        let local = self.selector.select();
        let shard = &self.shards[local];
        if let Some(value) = shard.take() {
            shard.record_hit();
            return Some(value);
        }
        for offset in 1..count {
            if let Some(value) = self.shards[(local + offset) % count].steal() {
                MetricsTracker::incr(&self.metrics.steals);
                return Some(value);
            }
        }
        None
    }

    fn create(&self) -> PoolResult<T> {
        let result = self.tracker.create();
        self.metrics.record_create(&result);
        result
    }

    /// Everything short of waiting.
    fn try_get(&self) -> PoolResult<T> {
        self.mark_active();
        // During a drain take_cached yields nothing and we go straight to the factory.
        if let Some(value) = self.take_cached() {
            return Ok(value);
        }
        self.create()
    }

    /// One attempt on behalf of a waiter; `None` keeps it waiting.
    fn retry_after_release(&self) -> Option<PoolResult<T>> {
        if let Some(value) = self.take_cached() {
            return Some(Ok(value));
        }
        if !self.tracker.can_create() {
            return None;
        }
        match self.create() {
            Err(PoolError::Exhausted { .. } | PoolError::NoFactory) => None,
            other => Some(other),
        }
    }

    fn timed_out(&self, wait: Duration) -> PoolResult<T> {
        MetricsTracker::incr(&self.metrics.timeouts);
        Err(PoolError::Timeout(wait))
    }

    fn get(&self, wait: Option<Duration>) -> PoolResult<T> {
        let err = match self.try_get() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(wait) = wait_budget(&err, wait) else {
            return Err(err);
        };
        match self.waiters.wait_blocking(wait, || self.retry_after_release()) {
            Some(result) => result,
            None => self.timed_out(wait),
        }
    }

    async fn get_async(&self, wait: Option<Duration>) -> PoolResult<T> {
        let err = match self.try_get() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(wait) = wait_budget(&err, wait) else {
            return Err(err);
        };
        match self.waiters.wait(wait, || self.retry_after_release()).await {
            Some(result) => result,
            None => self.timed_out(wait),
        }
    }

    fn release(&self, value: T) {
        self.mark_active();
        let rejected = match self.gate.enter() {
            Some(_deposit) => {
                let shard = &self.shards[self.selector.select()];
                match shard.give(value) {
                    Ok(()) => {
                        shard.record_returned();
                        None
                    }
                    Err(value) => {
                        tracing::trace!("shard full, discarding released object");
                        Some(value)
                    }
                }
            }
            None => Some(value),
        };
        if let Some(value) = rejected {
            self.discard_value(value);
        }
        self.waiters.wake();
    }

    fn discard_value(&self, value: T) {
        MetricsTracker::incr(&self.metrics.discarded);
        self.destroy(value);
    }

    fn destroy(&self, value: T) {
        self.tracker.destroy(value);
        MetricsTracker::incr(&self.metrics.destroyed);
    }

    /// Cache `value` in the first shard with room, starting at `start`.
    fn deposit_anywhere(&self, start: usize, mut value: T) -> Result<(), T> {
        let count = self.shards.len();
        for offset in 0..count {
            match self.shards[(start + offset) % count].give(value) {
                Ok(()) => return Ok(()),
                Err(back) => value = back,
            }
        }
        Err(value)
    }

    fn warmup(&self, count: usize) -> usize {
        // Warmed objects are evictable like any others.
        self.mark_active();
        let mut cached = 0;
        for i in 0..count {
            let value = match self.create() {
                Ok(value) => value,
                Err(err) => {
                    tracing::debug!(error = %err, "warm-up stopped early");
                    break;
                }
            };
            // The gate covers the deposit only, never the factory call.
            let (rejected, draining) = match self.gate.enter() {
                Some(_deposit) => (self.deposit_anywhere(i, value).err(), false),
                None => (Some(value), true),
            };
            match rejected {
                None => cached += 1,
                Some(value) => self.discard_value(value),
            }
            if draining {
                break;
            }
        }
        cached
    }

    fn drain_with(&self, prewarm: usize) -> Option<DrainReport> {
        let _drain = self.gate.begin_drain()?;
        self.state.set(EvictionState::Draining);

        let mut drained = Vec::new();
        for shard in self.shards.iter() {
            shard.drain_into(&mut drained);
        }
        let destroyed = drained.len();
        for value in drained {
            self.destroy(value);
        }

        // Replacements are built only once every drained object is gone.
        let mut prewarmed = 0;
        for i in 0..prewarm {
            match self.create() {
                Ok(value) => match self.deposit_anywhere(i, value) {
                    Ok(()) => prewarmed += 1,
                    Err(value) => self.discard_value(value),
                },
                Err(err) => {
                    tracing::warn!(error = %err, "pre-warm after drain stopped early");
                    break;
                }
            }
        }

        MetricsTracker::incr(&self.metrics.drains);
        self.state.set(EvictionState::Idle);
        Some(DrainReport {
            destroyed,
            prewarmed,
        })
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }

    fn get_metrics(&self) -> PoolMetrics {
        let (hits, returned) = self.shards.iter().fold((0, 0), |(hits, returned), shard| {
            (
                hits + shard.hits.load(Ordering::Relaxed),
                returned + shard.returned.load(Ordering::Relaxed),
            )
        });
        self.metrics.snapshot(
            hits,
            returned,
            self.len(),
            self.tracker.outstanding(),
            self.tracker.limit(),
        )
    }
}

impl<T: Send + 'static> IdleTarget for Inner<T> {
    fn take_activity(&self) -> bool {
        self.activity.swap(false, Ordering::AcqRel)
    }

    fn drain(&self) -> Option<DrainReport> {
        self.drain_with(self.prewarm_count)
    }

    fn set_state(&self, state: EvictionState) {
        self.state.set(state);
    }
}

impl<T: Send + 'static> Recycle<T> for Inner<T> {
    fn recycle(&self, value: T) {
        self.release(value);
    }

    fn discard(&self, value: T) {
        self.discard_value(value);
        self.waiters.wake();
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let mut remaining = Vec::new();
        for shard in self.shards.iter() {
            shard.drain_into(&mut remaining);
        }
        for value in remaining {
            self.tracker.destroy(value);
        }
    }
}

/// Thread-safe object pool partitioned into cache-padded shards
///
/// Acquire picks a random shard, tries its fast slot and overflow stack,
/// steals from the other shards on a miss, and finally calls the factory
/// subject to the configured limit. Release deposits into a random shard and
/// destroys the object when that shard is full. A background controller on
/// the ambient tokio runtime drains the pool after sustained idleness.
///
/// # Examples
///
/// ```
/// use hyperpool::{Lifecycle, PoolConfiguration, ShardedPool};
///
/// let pool = ShardedPool::new(
///     Lifecycle::new().with_factory(|| Vec::<u8>::with_capacity(1024)),
///     PoolConfiguration::new().with_shard_count(4).without_idle_eviction(),
/// )
/// .unwrap();
///
/// {
///     let mut buf = pool.get_object(None).unwrap();
///     buf.extend_from_slice(b"hello");
///     // Released back into the pool here
/// }
///
/// assert_eq!(pool.len(), 1);
/// ```
pub struct ShardedPool<T: Send + 'static> {
    inner: Arc<Inner<T>>,
    controller: Option<ControllerHandle>,
}

impl<T: Send + 'static> ShardedPool<T> {
    /// Build a pool; spawns the idle-eviction controller when it is enabled.
    ///
    /// Fails with [`PoolError::NoRuntime`] if idle eviction is enabled and no
    /// tokio runtime is running.
    pub fn new(lifecycle: Lifecycle<T>, config: PoolConfiguration) -> PoolResult<Self> {
        config.validate()?;

        let shards = (0..config.shard_count)
            .map(|_| CachePadded::new(Shard::new(config.shard_capacity)))
            .collect();
        let inner = Arc::new(Inner {
            shards,
            selector: ShardSelector::new(config.shard_count),
            tracker: Tracker::new(lifecycle, config.limit),
            gate: DrainGate::new(),
            waiters: Waiters::new(),
            activity: CachePadded::new(AtomicBool::new(false)),
            state: StateCell::default(),
            metrics: MetricsTracker::new(),
            prewarm_count: config.prewarm_count,
        });

        let controller = match config.idle_threshold {
            Some(threshold) => {
                let target = Arc::downgrade(&inner);
                let detector = IdleDetector::new(config.check_limit, threshold, Instant::now());
                let tick = config.tick_interval;
                Some(ControllerHandle::spawn(|shutdown| {
                    run_idle_controller(target, detector, tick, shutdown)
                })?)
            }
            None => None,
        };

        Ok(Self { inner, controller })
    }

    /// Acquire an object, reporting why none was available.
    ///
    /// With a non-zero `wait`, blocks the calling thread for up to `wait` when
    /// the limit is saturated (or there is no factory), retrying the cache and
    /// the factory after every release or discard.
    pub fn get(&self, wait: Option<Duration>) -> PoolResult<T> {
        self.inner.get(wait)
    }

    /// Acquire an object; `None` when nothing is cached and none can be built.
    pub fn acquire(&self, wait: Option<Duration>) -> Option<T> {
        self.get(wait).ok()
    }

    /// Like [`get`](Self::get), but waits without blocking the thread.
    pub async fn get_async(&self, wait: Option<Duration>) -> PoolResult<T> {
        self.inner.get_async(wait).await
    }

    pub async fn acquire_async(&self, wait: Option<Duration>) -> Option<T> {
        self.get_async(wait).await.ok()
    }

    /// Acquire an object wrapped in a guard that releases it on drop.
    pub fn get_object(&self, wait: Option<Duration>) -> PoolResult<PooledObject<T>> {
        let value = self.get(wait)?;
        Ok(PooledObject::new(value, self.recycler()))
    }

    pub async fn get_object_async(&self, wait: Option<Duration>) -> PoolResult<PooledObject<T>> {
        let value = self.get_async(wait).await?;
        Ok(PooledObject::new(value, self.recycler()))
    }

    /// Return an object for reuse. `None` is ignored.
    ///
    /// Never blocks; the object is destroyed if its shard is full or a drain
    /// is in progress.
    pub fn release(&self, value: impl Into<Option<T>>) {
        if let Some(value) = value.into() {
            self.inner.release(value);
        }
    }

    /// Destroy an object the caller no longer trusts.
    pub fn discard(&self, value: T) {
        Recycle::discard(&*self.inner, value);
    }

    /// Pre-populate the pool; returns how many objects were cached.
    pub fn warmup(&self, count: usize) -> usize {
        self.inner.warmup(count)
    }

    /// Run one drain now, pre-warming the configured count afterwards.
    /// `None` if a drain is already running.
    pub fn drain(&self) -> Option<DrainReport> {
        IdleTarget::drain(&*self.inner)
    }

    /// Stop the controller and destroy every cached object.
    pub async fn shutdown(mut self) -> DrainReport {
        if let Some(controller) = self.controller.take() {
            controller.stop().await;
        }
        self.inner.drain_with(0).unwrap_or_default()
    }

    /// Approximate number of cached objects.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Objects constructed and not yet destroyed.
    pub fn outstanding(&self) -> usize {
        self.inner.tracker.outstanding()
    }

    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.gate.is_draining()
    }

    pub fn eviction_state(&self) -> EvictionState {
        self.inner.state.get()
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

    pub fn get_health_status(&self) -> HealthStatus {
        HealthStatus::new(
            self.len(),
            self.outstanding(),
            self.inner.tracker.limit(),
            self.eviction_state(),
        )
    }

    fn recycler(&self) -> Arc<dyn Recycle<T>> {
        Arc::clone(&self.inner) as Arc<dyn Recycle<T>>
    }
}
