// hyperpool demo binary
// Run the demos with: cargo run --example basic

use hyperpool::{Lifecycle, PoolConfiguration, ShardedPool};

#[tokio::main]
async fn main() {
    println!("=== hyperpool ===");
    println!("See demos/ for usage examples");
    println!("Run: cargo run --example basic");
    println!();

    println!("Quick Demo:");
    let pool = match ShardedPool::new(
        Lifecycle::new().with_factory(|| Vec::<u8>::with_capacity(4096)),
        PoolConfiguration::new().with_shard_count(4),
    ) {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("  Failed to build pool: {err}");
            return;
        }
    };

    if let Ok(mut buf) = pool.get_object(None) {
        buf.extend_from_slice(b"hello");
        println!("  Got buffer with capacity {}", buf.capacity());
    }

    println!("  Cached after return: {}", pool.len());
    let report = pool.shutdown().await;
    println!("  Destroyed on shutdown: {}", report.destroyed);
}
