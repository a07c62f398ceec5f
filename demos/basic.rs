//! Basic usage examples for ShardedPool

use hyperpool::{Lifecycle, PoolConfiguration, PoolError, ShardedPool};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    println!("=== hyperpool - Basic Examples ===\n");

    // Example 1: Buffers recycled through a guard
    simple_pool();

    // Example 2: Limit with a bounded wait
    limited_pool();

    // Example 3: Many threads sharing one pool
    threaded_pool();

    // Example 4: Metrics, health and shutdown
    metrics_and_health().await;
}

fn simple_pool() {
    println!("1. Simple Pool:");
    let pool = ShardedPool::new(
        Lifecycle::new().with_factory(|| Vec::<u8>::with_capacity(4096)),
        PoolConfiguration::new().without_idle_eviction(),
    )
    .unwrap();

    {
        let mut buf = pool.get_object(None).unwrap();
        buf.extend_from_slice(b"payload");
        println!("   Got buffer of capacity {}", buf.capacity());
        // Callers reset state themselves before handing an object back
        buf.clear();
    }

    println!("   Cached after return: {}\n", pool.len());
}

fn limited_pool() {
    println!("2. Limited Pool:");
    let pool = ShardedPool::new(
        Lifecycle::new().with_factory(|| String::from("codec")),
        PoolConfiguration::new().with_limit(1).without_idle_eviction(),
    )
    .unwrap();

    let held = pool.acquire(None).unwrap();
    match pool.get(None) {
        Err(PoolError::Exhausted { limit }) => println!("   Limit of {limit} reached"),
        other => println!("   Unexpected: {other:?}"),
    }
    match pool.get(Some(Duration::from_millis(50))) {
        Err(err) => println!("   Waited and gave up: {err}"),
        Ok(_) => println!("   Unexpectedly got an object"),
    }

    pool.release(held);
    println!("   After release: {:?}\n", pool.acquire(None));
}

fn threaded_pool() {
    println!("3. Threaded Pool:");
    let pool = Arc::new(
        ShardedPool::new(
            Lifecycle::new().with_factory(|| vec![0u64; 64]),
            PoolConfiguration::new().with_shard_count(4).without_idle_eviction(),
        )
        .unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                for _ in 0..1_000 {
                    let mut scratch = pool.get_object(None).unwrap();
                    scratch[0] += 1;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let metrics = pool.get_metrics();
    println!("   Constructed: {}", metrics.created);
    println!("   Local hits: {}, steals: {}\n", metrics.hits, metrics.steals);
}

async fn metrics_and_health() {
    println!("4. Metrics and Health:");
    let pool = ShardedPool::new(
        Lifecycle::new()
            .with_factory(|| 0u32)
            .with_destructor(|_| println!("   destroyed one object")),
        PoolConfiguration::new()
            .with_limit(4)
            .with_idle_threshold(Duration::from_secs(60)),
    )
    .unwrap();

    println!("   Warmed up: {}", pool.warmup(3));
    let _held = pool.acquire(None);

    let health = pool.get_health_status();
    println!("   Healthy: {}", health.is_healthy());
    println!("   Utilization: {:.0}%", health.utilization * 100.0);
    println!("   Eviction state: {:?}", pool.eviction_state());

    println!("   Exported metrics:");
    let mut exported: Vec<_> = pool.export_metrics().into_iter().collect();
    exported.sort();
    for (key, value) in exported {
        println!("     {key}: {value}");
    }

    let report = pool.shutdown().await;
    println!("   Shutdown destroyed {} cached objects", report.destroyed);
}
