//! One partition of cached objects
//!
//! A shard has a lock-free fast slot (a depth-1 `ArrayQueue`) checked before a
//! mutex-guarded overflow stack. Shards are stored as `CachePadded<Shard<T>>`
//! so neighbours never share a cache line.

use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct Shard<T> {
    fast: ArrayQueue<T>,
    overflow: Mutex<Vec<T>>,
    overflow_cap: usize,
    pub(crate) hits: AtomicUsize,
    pub(crate) returned: AtomicUsize,
}

impl<T> Shard<T> {
    pub fn new(overflow_cap: usize) -> Self {
        Self {
            fast: ArrayQueue::new(1),
            overflow: Mutex::new(Vec::with_capacity(overflow_cap)),
            overflow_cap,
            hits: AtomicUsize::new(0),
            returned: AtomicUsize::new(0),
        }
    }

    /// Claim the fast slot.
    #[inline]
    pub fn try_take(&self) -> Option<T> {
        self.fast.pop()
    }

    /// Fill the fast slot if it is empty; hands the value back otherwise.
    #[inline]
    pub fn try_give(&self, value: T) -> Result<(), T> {
        self.fast.push(value)
    }

    /// Pop the most recently pushed overflow entry.
    pub fn take_overflow(&self) -> Option<T> {
        self.overflow.lock().pop()
    }

    /// Push onto the overflow stack unless it is at capacity.
    pub fn give_overflow(&self, value: T) -> Result<(), T> {
        let mut overflow = self.overflow.lock();
        if overflow.len() >= self.overflow_cap {
            return Err(value);
        }
        overflow.push(value);
        Ok(())
    }

    /// Take one object on behalf of another shard that missed locally.
    pub fn steal(&self) -> Option<T> {
        self.take_overflow().or_else(|| self.try_take())
    }

    /// Local acquire: fast slot, then overflow.
    #[inline]
    pub fn take(&self) -> Option<T> {
        self.try_take().or_else(|| self.take_overflow())
    }

    /// Local release: fast slot, then overflow.
    #[inline]
    pub fn give(&self, value: T) -> Result<(), T> {
        self.try_give(value).or_else(|value| self.give_overflow(value))
    }

    /// Move everything cached in this shard into `out`.
    pub fn drain_into(&self, out: &mut Vec<T>) {
        if let Some(value) = self.fast.pop() {
            out.push(value);
        }
        out.append(&mut *self.overflow.lock());
    }

    /// Objects held by this shard right now.
    pub fn len(&self) -> usize {
        self.fast.len() + self.overflow.lock().len()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_returned(&self) {
        self.returned.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fast_slot_holds_one() {
        let shard = Shard::new(0);
        assert!(shard.try_give(1).is_ok());
        assert_eq!(shard.try_give(2), Err(2));
        assert_eq!(shard.try_take(), Some(1));
        assert_eq!(shard.try_take(), None);
    }

    #[test]
    fn test_overflow_is_lifo() {
        let shard = Shard::new(4);
        for i in 0..3 {
            shard.give_overflow(i).unwrap();
        }
        assert_eq!(shard.take_overflow(), Some(2));
        assert_eq!(shard.take_overflow(), Some(1));
    }

    #[test]
    fn test_overflow_cap() {
        let shard = Shard::new(2);
        assert!(shard.give(1).is_ok());
        assert!(shard.give(2).is_ok());
        assert!(shard.give(3).is_ok());
        assert_eq!(shard.give(4), Err(4));
        assert_eq!(shard.len(), 1 + shard.overflow_cap);
    }

    #[test]
    fn test_take_prefers_fast_slot() {
        let shard = Shard::new(2);
        shard.give_overflow(10).unwrap();
        shard.try_give(20).unwrap();
        assert_eq!(shard.take(), Some(20));
        assert_eq!(shard.take(), Some(10));
        assert_eq!(shard.take(), None);
    }

    #[test]
    fn test_steal_prefers_overflow() {
        let shard = Shard::new(2);
        shard.try_give(1).unwrap();
        shard.give_overflow(2).unwrap();
        assert_eq!(shard.steal(), Some(2));
        assert_eq!(shard.steal(), Some(1));
        assert_eq!(shard.steal(), None);
    }

    #[test]
    fn test_drain_empties_both_paths() {
        let shard = Shard::new(3);
        for i in 0..4 {
            shard.give(i).unwrap();
        }
        let mut out = Vec::new();
        shard.drain_into(&mut out);
        out.sort();
        assert_eq!(out, vec![0, 1, 2, 3]);
        assert_eq!(shard.len(), 0);
    }
}
