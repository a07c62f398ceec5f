//! Randomized shard selection
//!
//! Each thread owns a xorshift64* generator seeded from the wall clock and its
//! thread id, so picking a shard never touches shared mutable state and never
//! makes a syscall after the first call on a thread.

use std::cell::Cell;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

thread_local! {
    static RNG: Cell<Xorshift64> = Cell::new(Xorshift64::new(time_seed()));
}

/// Fast, non-cryptographic xorshift64* generator.
///
/// # Examples
///
/// ```
/// use hyperpool::Xorshift64;
///
/// let mut rng = Xorshift64::new(42);
/// for _ in 0..1000 {
///     assert!(rng.next_below(7) < 7);
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    /// Create a generator; a zero seed is remapped since zero is a fixed point.
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = step(self.state);
        self.state.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform value in `[0, n)`; `n == 0` yields 0.
    pub fn next_below(&mut self, n: usize) -> usize {
        reduce(self.next_u64(), n)
    }
}

/// Picks one of `shards` partitions for the current operation.
///
/// The shard count is clamped to at least 1, and a single-shard selector
/// skips the generator entirely.
///
/// # Examples
///
/// ```
/// use hyperpool::ShardSelector;
///
/// let selector = ShardSelector::new(4);
/// assert_eq!(selector.shard_count(), 4);
/// assert!(selector.select() < 4);
///
/// assert_eq!(ShardSelector::new(0).shard_count(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSelector {
    shards: usize,
}

impl ShardSelector {
    pub fn new(shards: usize) -> Self {
        Self {
            shards: shards.max(1),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards
    }

    /// Index in `[0, shard_count)`.
    #[inline]
    pub fn select(&self) -> usize {
        if self.shards == 1 {
            return 0;
        }
        RNG.with(|cell| {
            let mut rng = cell.get();
            let index = rng.next_below(self.shards);
            cell.set(rng);
            index
        })
    }
}

#[inline]
fn step(mut x: u64) -> u64 {
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    x
}

// Multiply-shift range reduction: the high word of r * n is always < n.
#[inline]
fn reduce(r: u64, n: usize) -> usize {
    ((r as u128 * n as u128) >> 64) as usize
}

fn time_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    splitmix64(nanos ^ hasher.finish())
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_out_of_range() {
        for shards in 1..=17 {
            let selector = ShardSelector::new(shards);
            for _ in 0..2_000 {
                assert!(selector.select() < shards);
            }
        }
    }

    #[test]
    fn test_roughly_uniform() {
        let selector = ShardSelector::new(8);
        let mut counts = [0usize; 8];
        let rounds = 80_000;
        for _ in 0..rounds {
            counts[selector.select()] += 1;
        }
        let expected = rounds / 8;
        for count in counts {
            assert!(
                count > expected * 8 / 10 && count < expected * 12 / 10,
                "skewed distribution: {counts:?}"
            );
        }
    }

    #[test]
    fn test_select_follows_thread_generator() {
        RNG.with(|cell| cell.set(Xorshift64::new(42)));
        let mut expected = Xorshift64::new(42);
        let selector = ShardSelector::new(5);
        for _ in 0..100 {
            assert_eq!(selector.select(), expected.next_below(5));
        }
    }

    #[test]
    fn test_zero_seed_is_not_stuck() {
        let mut rng = Xorshift64::new(0);
        let a = rng.next_u64();
        let b = rng.next_u64();
        assert_ne!(a, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_next_below_zero() {
        let mut rng = Xorshift64::new(7);
        assert_eq!(rng.next_below(0), 0);
    }

    #[test]
    fn test_threads_get_independent_streams() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| RNG.with(|cell| cell.get().state)))
            .collect();
        let seeds: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for (i, a) in seeds.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &seeds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
