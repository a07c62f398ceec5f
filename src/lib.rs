//! # hyperpool
//!
//! Concurrency-safe object recycling pools for expensive, stateless-between-uses
//! objects such as buffers, codecs and connections.
//!
//! ## Features
//!
//! - Cache-padded shards, each with a lock-free fast slot and a capped LIFO overflow stack
//! - Per-thread xorshift shard selection, with stealing from other shards on a local miss
//! - Optional live-object limit with bounded blocking or async waits
//! - Automatic release of objects via RAII (Drop trait)
//! - Background idle eviction with hysteresis and pre-warming after a drain
//! - A bounded-queue variant with a release timer for strict capacity accounting
//! - Metrics snapshots, Prometheus text export and health status
//!
//! ## Quick Start
//!
//! ```rust
//! use hyperpool::{Lifecycle, PoolConfiguration, ShardedPool};
//!
//! let pool = ShardedPool::new(
//!     Lifecycle::new().with_factory(|| vec![0u8; 4096]),
//!     PoolConfiguration::new().without_idle_eviction(),
//! )
//! .unwrap();
//!
//! {
//!     let buf = pool.get_object(None).unwrap();
//!     assert_eq!(buf.len(), 4096);
//!     // Buffer goes back to the pool when `buf` goes out of scope
//! }
//!
//! assert_eq!(pool.len(), 1);
//! ```
//!
//! Idle eviction runs on the ambient tokio runtime, so pools that keep it
//! enabled must be built from inside one.

mod bounded;
mod config;
mod errors;
mod eviction;
mod gate;
mod health;
mod lifecycle;
mod metrics;
mod pool;
mod selector;
mod shard;
mod waiters;

pub use bounded::BoundedPool;
pub use config::{BoundedConfiguration, PoolConfiguration};
pub use errors::{PoolError, PoolResult};
pub use eviction::{DrainReport, EvictionState};
pub use health::HealthStatus;
pub use lifecycle::Lifecycle;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::{PooledObject, ShardedPool};
pub use selector::{ShardSelector, Xorshift64};
