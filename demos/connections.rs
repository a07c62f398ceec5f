//! Connection pooling with BoundedPool

use hyperpool::{BoundedConfiguration, BoundedPool, Lifecycle};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Connection {
    id: usize,
    queries: usize,
}

impl Connection {
    fn query(&mut self, sql: &str) -> String {
        self.queries += 1;
        format!("conn {} ran `{sql}` ({} so far)", self.id, self.queries)
    }
}

#[tokio::main]
async fn main() {
    println!("=== hyperpool - Connection Examples ===\n");

    let next_id = Arc::new(AtomicUsize::new(0));
    let pool = Arc::new(
        BoundedPool::new(
            Lifecycle::new()
                .with_factory(move || Connection {
                    id: next_id.fetch_add(1, Ordering::SeqCst),
                    queries: 0,
                })
                .with_destructor(|conn: Connection| println!("   closing conn {}", conn.id)),
            BoundedConfiguration::new()
                .with_max_conn(3)
                .with_max_keep(1)
                .with_release_after(Duration::from_millis(200)),
        )
        .unwrap(),
    );

    // Timed acquires wait for a released connection before opening a new
    // one, so open the full set up front.
    let opened: Vec<_> = (0..pool.capacity()).filter_map(|_| pool.acquire(None)).collect();
    for conn in opened {
        pool.release(conn);
    }

    println!("1. Concurrent queries over {} connections:", pool.capacity());
    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let mut conn = pool
                    .get_object_async(Some(Duration::from_secs(1)))
                    .await
                    .unwrap();
                let line = conn.query(&format!("SELECT {i}"));
                tokio::time::sleep(Duration::from_millis(20)).await;
                line
            })
        })
        .collect();
    for task in tasks {
        println!("   {}", task.await.unwrap());
    }
    println!("   Idle connections: {}\n", pool.len());

    println!("2. Release timer:");
    tokio::time::sleep(Duration::from_millis(400)).await;
    println!("   Idle connections after timer: {}\n", pool.len());

    println!("3. Prometheus export:");
    let mut tags = HashMap::new();
    tags.insert("db".to_string(), "primary".to_string());
    print!("{}", pool.export_metrics_prometheus("connections", Some(&tags)));

    if let Ok(pool) = Arc::try_unwrap(pool) {
        let report = pool.shutdown().await;
        println!("\n   Shutdown closed {} connections", report.destroyed);
    }
}
