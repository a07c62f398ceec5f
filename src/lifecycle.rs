//! Factory and destructor hooks, and the live-object accounting built on them

use crate::errors::{PoolError, PoolResult};
use crossbeam::utils::CachePadded;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Factory<T> = Arc<dyn Fn() -> Option<T> + Send + Sync>;
type Destructor<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Caller-supplied construction and teardown for pooled objects.
///
/// Both hooks may be called concurrently from any thread. The destructor must
/// not re-enter the pool.
///
/// # Examples
///
/// ```
/// use hyperpool::Lifecycle;
///
/// let lifecycle = Lifecycle::new()
///     .with_factory(|| Vec::<u8>::with_capacity(4096))
///     .with_destructor(|buf: Vec<u8>| drop(buf));
///
/// assert!(lifecycle.has_factory());
/// ```
pub struct Lifecycle<T> {
    factory: Option<Factory<T>>,
    destructor: Option<Destructor<T>>,
}

impl<T> Default for Lifecycle<T> {
    fn default() -> Self {
        Self {
            factory: None,
            destructor: None,
        }
    }
}

impl<T> Clone for Lifecycle<T> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            destructor: self.destructor.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Lifecycle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("factory", &self.factory.is_some())
            .field("destructor", &self.destructor.is_some())
            .finish()
    }
}

impl<T> Lifecycle<T> {
    /// No factory and no destructor
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct objects with an infallible factory
    pub fn with_factory<F>(self, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.with_fallible_factory(move || Some(factory()))
    }

    /// Construct objects with a factory that may fail by returning `None`
    pub fn with_fallible_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Option<T> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Called once for every object that leaves the pool permanently
    pub fn with_destructor<F>(mut self, destructor: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.destructor = Some(Arc::new(destructor));
        self
    }

    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }
}

/// Lifecycle hooks plus the `outstanding` counter that enforces `limit`.
pub(crate) struct Tracker<T> {
    lifecycle: Lifecycle<T>,
    outstanding: CachePadded<AtomicUsize>,
    limit: Option<usize>,
}

impl<T> Tracker<T> {
    pub fn new(lifecycle: Lifecycle<T>, limit: Option<usize>) -> Self {
        Self {
            lifecycle,
            outstanding: CachePadded::new(AtomicUsize::new(0)),
            limit,
        }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Whether `create` could currently succeed, ignoring factory failures.
    pub fn can_create(&self) -> bool {
        self.lifecycle.factory.is_some()
            && self.limit.is_none_or(|limit| self.outstanding() < limit)
    }

    /// Reserve a slot under `limit`, run the factory, and give the slot back
    /// if construction fails.
    pub fn create(&self) -> PoolResult<T> {
        let factory = self.lifecycle.factory.as_ref().ok_or(PoolError::NoFactory)?;
        self.reserve()?;

        match catch_unwind(AssertUnwindSafe(|| factory())) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => {
                self.unreserve();
                Err(PoolError::FactoryFailed)
            }
            Err(_) => {
                self.unreserve();
                tracing::warn!("pool factory panicked, treating as construction failure");
                Err(PoolError::FactoryFailed)
            }
        }
    }

    /// Hand `value` to the destructor and drop it from the live count.
    ///
    /// The count is decremented even if the destructor panics.
    pub fn destroy(&self, value: T) {
        if let Some(destructor) = self.lifecycle.destructor.as_ref() {
            if catch_unwind(AssertUnwindSafe(|| destructor(value))).is_err() {
                tracing::warn!("pool destructor panicked, object considered destroyed");
            }
        } else {
            drop(value);
        }
        self.unreserve();
    }

    fn reserve(&self) -> PoolResult<()> {
        match self.limit {
            None => {
                self.outstanding.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Some(limit) => self
                .outstanding
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < limit).then_some(current + 1)
                })
                .map(|_| ())
                .map_err(|_| PoolError::Exhausted { limit }),
        }
    }

    // Saturating so objects the pool never built (caller-seeded) cannot underflow.
    fn unreserve(&self) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(1))
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_limit_enforced() {
        let tracker = Tracker::new(Lifecycle::new().with_factory(|| 1u32), Some(2));
        assert!(tracker.create().is_ok());
        assert!(tracker.create().is_ok());
        assert_eq!(tracker.create(), Err(PoolError::Exhausted { limit: 2 }));
        assert_eq!(tracker.outstanding(), 2);
        assert!(!tracker.can_create());
    }

    #[test]
    fn test_failed_factory_releases_reservation() {
        let tracker = Tracker::new(
            Lifecycle::<u32>::new().with_fallible_factory(|| None),
            Some(1),
        );
        assert_eq!(tracker.create(), Err(PoolError::FactoryFailed));
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_panicking_factory_is_a_failure() {
        let tracker = Tracker::new(
            Lifecycle::<u32>::new().with_factory(|| panic!("boom")),
            None,
        );
        assert_eq!(tracker.create(), Err(PoolError::FactoryFailed));
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_no_factory() {
        let tracker = Tracker::<u32>::new(Lifecycle::new(), None);
        assert_eq!(tracker.create(), Err(PoolError::NoFactory));
        assert!(!tracker.can_create());
    }

    #[test]
    fn test_destroy_decrements_even_on_panic() {
        let tracker = Tracker::new(
            Lifecycle::new()
                .with_factory(|| 1u32)
                .with_destructor(|_| panic!("close failed")),
            None,
        );
        let value = tracker.create().unwrap();
        tracker.destroy(value);
        assert_eq!(tracker.outstanding(), 0);
    }

    #[test]
    fn test_destroy_foreign_object_saturates() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let tracker = Tracker::new(
            Lifecycle::new().with_destructor(move |_: u32| flag.store(true, Ordering::SeqCst)),
            None,
        );
        tracker.destroy(9);
        assert!(called.load(Ordering::SeqCst));
        assert_eq!(tracker.outstanding(), 0);
    }
}
