//! 集成测试共用的替身与样例数据

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use order_service::{Item, Order, OrderError, OrderRepositoryTrait, Result};
use order_shared::error::InfraError;
use order_shared::kafka::{ConsumerMessage, MessageSource};
use parking_lot::Mutex;
use tokio::sync::watch;

pub const SAMPLE_ORDER_JSON: &str = include_str!("../fixtures/order.json");

/// 以样例消息为模板构造订单
pub fn sample_order(order_uid: &str) -> Order {
    let mut order: Order = serde_json::from_str(SAMPLE_ORDER_JSON).unwrap();
    order.order_uid = order_uid.to_string();
    order.payment.transaction = order_uid.to_string();
    order
}

/// 构造只含指定商品名的订单
pub fn order_with_items(order_uid: &str, names: &[&str]) -> Order {
    let mut order = sample_order(order_uid);
    let template = order.items[0].clone();
    order.items = names
        .iter()
        .map(|name| Item {
            name: name.to_string(),
            ..template.clone()
        })
        .collect();
    order
}

/// 创建时间递增的一批订单，第 i 个比第 i-1 个晚一分钟
pub fn orders_created_in_sequence(count: usize) -> Vec<Order> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let mut order = sample_order(&format!("order-{i:03}"));
            order.date_created = base + Duration::minutes(i as i64);
            order
        })
        .collect()
}

pub fn message(offset: i64, payload: impl Into<Vec<u8>>) -> ConsumerMessage {
    ConsumerMessage {
        topic: "orders".to_string(),
        partition: 0,
        offset,
        key: None,
        payload: payload.into(),
        timestamp: None,
        headers: HashMap::new(),
    }
}

pub fn order_message(offset: i64, order: &Order) -> ConsumerMessage {
    message(offset, serde_json::to_vec(order).unwrap())
}

// ---------------------------------------------------------------------------
// InMemoryOrderRepository
// ---------------------------------------------------------------------------

/// 内存订单仓储
///
/// 按 upsert 语义整体替换聚合，支持注入失败和统计调用次数。
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<HashMap<String, Order>>,
    upsert_failures_left: AtomicUsize,
    upsert_calls: AtomicUsize,
    get_calls: AtomicUsize,
    /// 列表中出现但读取时报错的订单号，模拟并发写入竞争
    vanishing: Mutex<Vec<String>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 接下来的 `n` 次 upsert 返回持久化错误
    pub fn fail_next_upserts(&self, n: usize) {
        self.upsert_failures_left.store(n, Ordering::SeqCst);
    }

    /// 直接写入存储，不经过服务和缓存
    pub fn insert_raw(&self, order: Order) {
        self.orders.lock().insert(order.order_uid.clone(), order);
    }

    pub fn make_unreadable(&self, order_uid: &str) {
        self.vanishing.lock().push(order_uid.to_string());
    }

    pub fn stored(&self, order_uid: &str) -> Option<Order> {
        self.orders.lock().get(order_uid).cloned()
    }

    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn sorted_uids(&self) -> Vec<String> {
        let orders = self.orders.lock();
        let mut entries: Vec<_> = orders.values().collect();
        entries.sort_by(|a, b| {
            b.date_created
                .cmp(&a.date_created)
                .then_with(|| a.order_uid.cmp(&b.order_uid))
        });
        entries.into_iter().map(|o| o.order_uid.clone()).collect()
    }
}

#[async_trait]
impl OrderRepositoryTrait for InMemoryOrderRepository {
    async fn upsert(&self, order: &Order) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .upsert_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(OrderError::Persistence(sqlx::Error::PoolTimedOut));
        }

        self.insert_raw(order.clone());
        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Order> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        if self.vanishing.lock().iter().any(|uid| uid == order_uid) {
            return Err(OrderError::not_found(order_uid));
        }
        self.stored(order_uid)
            .ok_or_else(|| OrderError::not_found(order_uid))
    }

    async fn list_latest(&self, limit: i64) -> Result<Vec<Order>> {
        if limit <= 0 {
            return Ok(vec![]);
        }
        let mut out = Vec::new();
        for uid in self.sorted_uids().into_iter().take(limit as usize) {
            if let Ok(order) = self.get_by_id(&uid).await {
                out.push(order);
            }
        }
        Ok(out)
    }

    async fn list_order_uids(&self, limit: i64, offset: i64) -> Result<Vec<String>> {
        Ok(self
            .sorted_uids()
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_orders(&self) -> Result<i64> {
        Ok(self.orders.lock().len() as i64)
    }
}

// ---------------------------------------------------------------------------
// ScriptedMessageSource
// ---------------------------------------------------------------------------

/// 消息源的可观察记录
#[derive(Debug, Default)]
pub struct SourceLog {
    pub fetched: Vec<i64>,
    pub committed: Vec<i64>,
    pub rewound: Vec<i64>,
}

/// 按脚本投递消息的消息源
///
/// 回退时把消息放回队首，模拟 broker 重新投递。脚本耗尽后发出关闭信号。
pub struct ScriptedMessageSource {
    queue: VecDeque<ConsumerMessage>,
    fail_commits: bool,
    log: Arc<Mutex<SourceLog>>,
    shutdown: watch::Sender<bool>,
}

impl ScriptedMessageSource {
    pub fn new(
        messages: Vec<ConsumerMessage>,
    ) -> (Self, Arc<Mutex<SourceLog>>, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        let log = Arc::new(Mutex::new(SourceLog::default()));
        let source = Self {
            queue: messages.into(),
            fail_commits: false,
            log: log.clone(),
            shutdown: tx,
        };
        (source, log, rx)
    }

    pub fn with_failing_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }
}

#[async_trait]
impl MessageSource for ScriptedMessageSource {
    async fn fetch(&mut self) -> std::result::Result<ConsumerMessage, InfraError> {
        match self.queue.pop_front() {
            Some(msg) => {
                self.log.lock().fetched.push(msg.offset);
                Ok(msg)
            }
            None => {
                let _ = self.shutdown.send(true);
                Err(InfraError::Kafka("script exhausted".to_string()))
            }
        }
    }

    async fn commit(&mut self, msg: &ConsumerMessage) -> std::result::Result<(), InfraError> {
        if self.fail_commits {
            return Err(InfraError::Kafka("commit rejected".to_string()));
        }
        self.log.lock().committed.push(msg.offset);
        Ok(())
    }

    async fn rewind(&mut self, msg: &ConsumerMessage) -> std::result::Result<(), InfraError> {
        self.log.lock().rewound.push(msg.offset);
        self.queue.push_front(msg.clone());
        Ok(())
    }
}
