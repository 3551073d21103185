//! 缓存并发读写测试

mod common;

use std::sync::Arc;
use std::thread;

use order_service::{MemoryOrderCache, OrderCache};

const WRITERS: usize = 4;
const READERS: usize = 8;
const ROUNDS: usize = 500;
const KEYS: usize = 16;

#[test]
fn test_concurrent_reads_and_writes_on_overlapping_keys() {
    let cache = Arc::new(MemoryOrderCache::new());

    let templates: Arc<Vec<_>> = Arc::new(
        (0..KEYS)
            .map(|i| common::sample_order(&format!("key-{i}")))
            .collect(),
    );

    let mut handles = Vec::new();

    for w in 0..WRITERS {
        let cache = cache.clone();
        let templates = templates.clone();
        handles.push(thread::spawn(move || {
            for round in 0..ROUNDS {
                let mut order = templates[(w + round) % KEYS].clone();
                order.track_number = format!("writer-{w}-round-{round}");
                cache.set(order);
            }
        }));
    }

    for r in 0..READERS {
        let cache = cache.clone();
        handles.push(thread::spawn(move || {
            for round in 0..ROUNDS {
                let uid = format!("key-{}", (r + round) % KEYS);
                if let Some(order) = cache.get(&uid) {
                    // 读到的总是某次完整写入的值
                    assert_eq!(order.order_uid, uid);
                    assert!(order.track_number.starts_with("writer-"));
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(cache.len(), KEYS);

    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, (READERS * ROUNDS) as u64);
}

#[test]
fn test_bulk_set_concurrent_with_set() {
    let cache = Arc::new(MemoryOrderCache::new());

    let bulk = {
        let cache = cache.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                let batch = (0..KEYS)
                    .map(|i| common::sample_order(&format!("bulk-{i}")))
                    .collect();
                cache.bulk_set(batch);
            }
        })
    };

    let single = {
        let cache = cache.clone();
        thread::spawn(move || {
            for i in 0..200 {
                cache.set(common::sample_order(&format!("single-{}", i % KEYS)));
            }
        })
    };

    bulk.join().unwrap();
    single.join().unwrap();

    assert_eq!(cache.len(), KEYS * 2);
}
