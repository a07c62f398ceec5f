//! Idle eviction: detect sustained inactivity and drain cached objects
//!
//! The controller is a single tokio task per pool. On every tick it swaps the
//! pool's activity flag and feeds the result to an [`IdleDetector`]; once the
//! detector has seen `check_limit` idle ticks spanning at least the idle
//! threshold, the pool is drained through its destructor and pre-warmed.

use crate::errors::{PoolError, PoolResult};
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Where the idle-eviction controller currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub enum EvictionState {
    /// Activity seen recently, or nothing left to drain
    #[default]
    Idle,

    /// Counting consecutive idle ticks
    Checking,

    /// Emptying shards through the destructor
    Draining,
}

/// Outcome of one drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "metrics", derive(serde::Serialize))]
pub struct DrainReport {
    /// Cached objects passed to the destructor
    pub destroyed: usize,

    /// Fresh objects constructed and cached after the drain
    pub prewarmed: usize,
}

#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn get(&self) -> EvictionState {
        match self.0.load(Ordering::Acquire) {
            1 => EvictionState::Checking,
            2 => EvictionState::Draining,
            _ => EvictionState::Idle,
        }
    }

    pub fn set(&self, state: EvictionState) {
        let raw = match state {
            EvictionState::Idle => 0,
            EvictionState::Checking => 1,
            EvictionState::Draining => 2,
        };
        self.0.store(raw, Ordering::Release);
    }
}

/// Hysteresis state machine driven once per tick.
#[derive(Debug)]
pub(crate) struct IdleDetector {
    state: EvictionState,
    idle_ticks: u32,
    check_limit: u32,
    idle_threshold: Duration,
    last_active: Instant,
    armed: bool,
}

impl IdleDetector {
    pub fn new(check_limit: u32, idle_threshold: Duration, now: Instant) -> Self {
        Self {
            state: EvictionState::Idle,
            idle_ticks: 0,
            check_limit: check_limit.max(1),
            idle_threshold,
            last_active: now,
            armed: false,
        }
    }

    pub fn state(&self) -> EvictionState {
        self.state
    }

    /// Returns `true` when the pool should be drained now.
    pub fn observe(&mut self, active: bool, now: Instant) -> bool {
        if active {
            self.idle_ticks = 0;
            self.last_active = now;
            self.armed = true;
            self.state = EvictionState::Idle;
            return false;
        }
        // Nothing has been used since the last drain.
        if !self.armed {
            self.state = EvictionState::Idle;
            return false;
        }

        self.idle_ticks = self.idle_ticks.saturating_add(1);
        let idle_for = now.saturating_duration_since(self.last_active);
        if self.idle_ticks >= self.check_limit && idle_for >= self.idle_threshold {
            self.state = EvictionState::Draining;
            true
        } else {
            self.state = EvictionState::Checking;
            false
        }
    }

    pub fn drained(&mut self) {
        self.idle_ticks = 0;
        self.armed = false;
        self.state = EvictionState::Idle;
    }
}

/// What the controller needs from a pool.
pub(crate) trait IdleTarget: Send + Sync + 'static {
    /// Read and clear the activity marker.
    fn take_activity(&self) -> bool;

    fn drain(&self) -> Option<DrainReport>;

    fn set_state(&self, state: EvictionState);
}

/// Owner of a pool's background task; aborts it when dropped.
pub(crate) struct ControllerHandle {
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Spawn `task` on the current tokio runtime.
    pub fn spawn<F, Fut>(task: F) -> PoolResult<Self>
    where
        F: FnOnce(Arc<Notify>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        let shutdown = Arc::new(Notify::new());
        let task = runtime.spawn(task(Arc::clone(&shutdown)));
        Ok(Self {
            shutdown,
            task: Some(task),
        })
    }

    /// Signal the task and wait for it to finish.
    pub async fn stop(mut self) {
        self.shutdown.notify_one();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Controller loop; exits on shutdown or once the pool is gone.
pub(crate) async fn run_idle_controller<P: IdleTarget>(
    target: Weak<P>,
    mut detector: IdleDetector,
    tick: Duration,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!(?tick, "idle eviction controller started");

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {}
        }
        let Some(pool) = target.upgrade() else {
            break;
        };

        let active = pool.take_activity();
        let should_drain = detector.observe(active, Instant::now());
        pool.set_state(detector.state());
        if should_drain {
            if let Some(report) = pool.drain() {
                tracing::debug!(
                    destroyed = report.destroyed,
                    prewarmed = report.prewarmed,
                    "drained idle pool"
                );
            }
            detector.drained();
            pool.set_state(detector.state());
        }
    }

    tracing::debug!("idle eviction controller stopped");
}
