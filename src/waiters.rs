//! Bounded waits for a concurrently released object
//!
//! Waiters are counted so that a release only touches the condvar or the
//! `Notify` when somebody is actually waiting. A waiter is registered for the
//! duration of its own wait and nothing outlives a timeout.

use crate::errors::PoolError;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
pub(crate) struct Waiters {
    count: AtomicUsize,
    // Bumped by every wake so a blocking waiter can tell it missed one.
    generation: AtomicU64,
    lock: Mutex<()>,
    condvar: Condvar,
    notify: Notify,
}

struct Registration<'a>(&'a AtomicUsize);

impl<'a> Registration<'a> {
    fn new(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Waiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the calling thread until `retry` produces a value or `timeout`
    /// elapses. `retry` runs once up front and again after every wake-up,
    /// never under the condvar's mutex.
    pub fn wait_blocking<T>(
        &self,
        timeout: Duration,
        mut retry: impl FnMut() -> Option<T>,
    ) -> Option<T> {
        let deadline = std::time::Instant::now() + timeout;
        let _registration = Registration::new(&self.count);
        loop {
            let seen = self.generation.load(Ordering::SeqCst);
            if let Some(value) = retry() {
                return Some(value);
            }
            let mut guard = self.lock.lock();
            if self.generation.load(Ordering::SeqCst) != seen {
                continue;
            }
            if self.condvar.wait_until(&mut guard, deadline).timed_out() {
                drop(guard);
                return retry();
            }
        }
    }

    /// Async counterpart of [`wait_blocking`](Self::wait_blocking).
    pub async fn wait<T>(&self, timeout: Duration, mut retry: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = tokio::time::Instant::now() + timeout;
        let _registration = Registration::new(&self.count);
        loop {
            // Enabled before the retry so a release in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(value) = retry() {
                return Some(value);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return retry();
            }
        }
    }

    /// Wake waiters after an object was deposited or destroyed.
    #[inline]
    pub fn wake(&self) {
        if self.count.load(Ordering::SeqCst) == 0 {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let _guard = self.lock.lock();
            self.condvar.notify_all();
        }
        self.notify.notify_waiters();
    }
}

/// How long to wait after a failed acquire, if at all. Waiting only helps
/// when a release could change the outcome.
pub(crate) fn wait_budget(err: &PoolError, wait: Option<Duration>) -> Option<Duration> {
    let wait = wait.filter(|wait| !wait.is_zero())?;
    matches!(err, PoolError::Exhausted { .. } | PoolError::NoFactory).then_some(wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    #[test]
    fn test_blocking_times_out() {
        let waiters = Waiters::new();
        let start = Instant::now();
        let got: Option<u32> = waiters.wait_blocking(Duration::from_millis(30), || None);
        assert!(got.is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
        assert_eq!(waiters.count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_blocking_woken_by_release() {
        let waiters = Arc::new(Waiters::new());
        let ready = Arc::new(AtomicBool::new(false));
        let waker = {
            let waiters = Arc::clone(&waiters);
            let ready = Arc::clone(&ready);
            std::thread::spawn(move || {
                while waiters.count.load(Ordering::SeqCst) == 0 {
                    std::thread::yield_now();
                }
                ready.store(true, Ordering::SeqCst);
                waiters.wake();
            })
        };
        let start = Instant::now();
        let got = waiters.wait_blocking(Duration::from_secs(10), || {
            ready.load(Ordering::SeqCst).then_some(7)
        });
        waker.join().unwrap();
        assert_eq!(got, Some(7));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_async_woken_by_release() {
        let waiters = Arc::new(Waiters::new());
        let ready = Arc::new(AtomicBool::new(false));
        let task = {
            let waiters = Arc::clone(&waiters);
            let ready = Arc::clone(&ready);
            tokio::spawn(async move {
                waiters
                    .wait(Duration::from_secs(10), || ready.load(Ordering::SeqCst).then_some(3))
                    .await
            })
        };
        while waiters.count.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        ready.store(true, Ordering::SeqCst);
        waiters.wake();
        assert_eq!(task.await.unwrap(), Some(3));
    }

    #[test]
    fn test_wait_budget() {
        let wait = Some(Duration::from_millis(5));
        assert_eq!(wait_budget(&PoolError::NoFactory, wait), wait);
        assert_eq!(wait_budget(&PoolError::Exhausted { limit: 1 }, wait), wait);
        assert_eq!(wait_budget(&PoolError::FactoryFailed, wait), None);
        assert_eq!(wait_budget(&PoolError::NoFactory, Some(Duration::ZERO)), None);
        assert_eq!(wait_budget(&PoolError::NoFactory, None), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_times_out_without_registration_left() {
        let waiters = Waiters::new();
        let got: Option<u8> = waiters.wait(Duration::from_secs(1), || None).await;
        assert!(got.is_none());
        assert_eq!(waiters.count.load(Ordering::SeqCst), 0);
    }
}
