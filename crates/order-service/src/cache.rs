//! 订单内存缓存
//!
//! 以 `order_uid` 为键的进程内缓存，作为数据库的派生投影，可随时从库中重建。
//! 读写锁保护映射：读者之间并行，写者与所有人互斥。
//! 命中/未命中计数使用独立的原子变量，不参与锁竞争。
//!
//! 不设 TTL、不淘汰、不限容量。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use order_shared::observability::metrics;
use parking_lot::RwLock;
use serde::Serialize;

use crate::models::Order;

/// 命中统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// 命中率，尚无访问时为 0
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 订单缓存接口
///
/// 所有操作都不会失败。空 `order_uid` 的写入被静默忽略。
pub trait OrderCache: Send + Sync {
    fn get(&self, order_uid: &str) -> Option<Order>;
    fn set(&self, order: Order);
    fn bulk_set(&self, orders: Vec<Order>);
    fn len(&self) -> usize;
    fn stats(&self) -> CacheStats;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 基于读写锁的内存缓存
#[derive(Default)]
pub struct MemoryOrderCache {
    store: RwLock<HashMap<String, Order>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryOrderCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderCache for MemoryOrderCache {
    fn get(&self, order_uid: &str) -> Option<Order> {
        // 克隆在读锁内完成，锁外只统计
        let found = self.store.read().get(order_uid).cloned();

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_hit();
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_miss();
        }
        found
    }

    fn set(&self, order: Order) {
        if order.order_uid.is_empty() {
            return;
        }
        let entries = {
            let mut store = self.store.write();
            store.insert(order.order_uid.clone(), order);
            store.len()
        };
        metrics::set_cache_entries(entries);
    }

    fn bulk_set(&self, orders: Vec<Order>) {
        let entries = {
            let mut store = self.store.write();
            for order in orders {
                if order.order_uid.is_empty() {
                    continue;
                }
                store.insert(order.order_uid.clone(), order);
            }
            store.len()
        };
        metrics::set_cache_entries(entries);
    }

    fn len(&self) -> usize {
        self.store.read().len()
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
