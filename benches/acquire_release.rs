use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hyperpool::{BoundedConfiguration, BoundedPool, Lifecycle, PoolConfiguration, ShardedPool};
use std::sync::Arc;
use std::thread;

const OPS_PER_THREAD: usize = 10_000;

fn sharded_pool(shards: usize) -> Arc<ShardedPool<Vec<u8>>> {
    Arc::new(
        ShardedPool::new(
            Lifecycle::new().with_factory(|| vec![0u8; 1024]),
            PoolConfiguration::new()
                .with_shard_count(shards)
                .without_idle_eviction(),
        )
        .unwrap(),
    )
}

fn bench_single_thread(c: &mut Criterion) {
    let pool = sharded_pool(1);
    pool.warmup(1);

    c.bench_function("sharded_acquire_release", |b| {
        b.iter(|| {
            let buf = pool.acquire(None).unwrap();
            black_box(&buf);
            pool.release(buf);
        })
    });

    let bounded = BoundedPool::new(
        Lifecycle::new().with_factory(|| vec![0u8; 1024]),
        BoundedConfiguration::new().with_max_conn(8).without_release_timer(),
    )
    .unwrap();

    c.bench_function("bounded_acquire_release", |b| {
        b.iter(|| {
            let buf = bounded.acquire(None).unwrap();
            black_box(&buf);
            bounded.release(buf);
        })
    });
}

fn bench_parallel(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_acquire_release");
    let threads = thread::available_parallelism().map_or(4, |n| n.get());

    for shards in [1, threads] {
        group.bench_with_input(BenchmarkId::new("shards", shards), &shards, |b, &shards| {
            let pool = sharded_pool(shards);
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let pool = Arc::clone(&pool);
                        thread::spawn(move || {
                            for _ in 0..OPS_PER_THREAD {
                                let buf = pool.get_object(None).unwrap();
                                black_box(&*buf);
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_thread, bench_parallel);
criterion_main!(benches);
