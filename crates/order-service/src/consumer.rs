//! 订单消息消费者
//!
//! 单条在途的拉取 → 解码 → 入库 → 提交循环，以显式状态机实现：
//!
//! ```text
//! Fetching ──ok──▶ Decoding ──ok──▶ Persisting ──ok──▶ Committing ──▶ Fetching
//!    │                 │                 │
//!    │err              │err（毒消息）     │err
//!    ▼                 ▼                 ▼
//! BackoffSleep     Committing        回退位点 + BackoffSleep ──▶ Fetching
//! ```
//!
//! - 拉取失败：固定延迟后重新拉取，位点不动
//! - 解码失败：立即提交并跳过，永不重试
//! - 入库失败：不提交，回退位点后固定延迟，重新拉取同一条消息，无限重试
//! - 提交失败：记录日志后继续，消息可能被重复投递，依赖入库幂等
//!
//! 处理顺序等于拉取顺序，提交顺序等于处理顺序。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use order_shared::backoff::{FixedBackoff, SleepOutcome, sleep_or_shutdown};
use order_shared::kafka::{ConsumerMessage, MessageSource};
use order_shared::observability::metrics::{self, outcome};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::decoder;
use crate::models::Order;
use crate::service::OrderUseCase;

/// 消费状态
#[derive(Debug)]
pub enum ConsumerState {
    Fetching,
    Decoding(ConsumerMessage),
    Persisting(ConsumerMessage, Order),
    Committing(ConsumerMessage),
    /// 等待 `delay` 后进入 `next`
    BackoffSleep {
        delay: Duration,
        next: Box<ConsumerState>,
    },
    Closed,
}

impl ConsumerState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Decoding(_) => "decoding",
            Self::Persisting(..) => "persisting",
            Self::Committing(_) => "committing",
            Self::BackoffSleep { .. } => "backoff_sleep",
            Self::Closed => "closed",
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// 消费计数
#[derive(Debug, Default)]
pub struct ConsumerStats {
    ingested: AtomicU64,
    skipped: AtomicU64,
    retried: AtomicU64,
    fetch_errors: AtomicU64,
    commit_errors: AtomicU64,
}

/// 消费计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStatsSnapshot {
    pub ingested: u64,
    pub skipped: u64,
    pub retried: u64,
    pub fetch_errors: u64,
    pub commit_errors: u64,
}

impl ConsumerStats {
    fn incr(counter: &AtomicU64, label: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::record_consumed(label);
    }

    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            ingested: self.ingested.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            commit_errors: self.commit_errors.load(Ordering::Relaxed),
        }
    }
}

/// 订单消费者
///
/// 持有消息源，通过 [`OrderUseCase`] 入库。由 main 在独立任务中运行。
pub struct OrderConsumer<S, U>
where
    S: MessageSource,
    U: OrderUseCase + ?Sized,
{
    source: S,
    service: Arc<U>,
    backoff: FixedBackoff,
    shutdown: watch::Receiver<bool>,
    stats: Arc<ConsumerStats>,
}

impl<S, U> OrderConsumer<S, U>
where
    S: MessageSource,
    U: OrderUseCase + ?Sized,
{
    pub fn new(
        source: S,
        service: Arc<U>,
        backoff: FixedBackoff,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            service,
            backoff,
            shutdown,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    /// 共享的计数器，运行期间可供外部读取
    pub fn stats(&self) -> Arc<ConsumerStats> {
        self.stats.clone()
    }

    /// 运行消费循环直到收到关闭信号，返回最终计数
    pub async fn run(mut self) -> ConsumerStatsSnapshot {
        info!("订单消费者已启动");

        let mut state = ConsumerState::Fetching;
        while !state.is_closed() {
            state = self.step(state).await;
        }

        let snapshot = self.stats.snapshot();
        info!(
            ingested = snapshot.ingested,
            skipped = snapshot.skipped,
            retried = snapshot.retried,
            "订单消费者已停止"
        );
        snapshot
    }

    /// 执行一次状态转移
    pub async fn step(&mut self, state: ConsumerState) -> ConsumerState {
        trace!(state = state.name(), "状态转移");
        match state {
            ConsumerState::Fetching => self.fetch().await,
            ConsumerState::Decoding(msg) => self.decode(msg),
            ConsumerState::Persisting(msg, order) => self.persist(msg, order).await,
            ConsumerState::Committing(msg) => self.commit(msg).await,
            ConsumerState::BackoffSleep { delay, next } => {
                match sleep_or_shutdown(delay, &mut self.shutdown).await {
                    SleepOutcome::Elapsed => *next,
                    SleepOutcome::Shutdown => ConsumerState::Closed,
                }
            }
            ConsumerState::Closed => ConsumerState::Closed,
        }
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn fetch(&mut self) -> ConsumerState {
        if self.shutting_down() {
            return ConsumerState::Closed;
        }

        let result = tokio::select! {
            biased;

            changed = self.shutdown.changed() => {
                if changed.is_err() || *self.shutdown.borrow() {
                    return ConsumerState::Closed;
                }
                return ConsumerState::Fetching;
            }

            result = self.source.fetch() => result,
        };

        match result {
            Ok(msg) => ConsumerState::Decoding(msg),
            // 关闭过程中拉取被中断，不算失败
            Err(_) if self.shutting_down() => ConsumerState::Closed,
            Err(e) => {
                ConsumerStats::incr(&self.stats.fetch_errors, outcome::FETCH_ERROR);
                warn!(error = %e, "拉取消息失败，稍后重试");
                ConsumerState::BackoffSleep {
                    delay: self.backoff.fetch_error_delay,
                    next: Box::new(ConsumerState::Fetching),
                }
            }
        }
    }

    fn decode(&self, msg: ConsumerMessage) -> ConsumerState {
        match decoder::decode(&msg.payload) {
            Ok(order) => ConsumerState::Persisting(msg, order),
            Err(e) => {
                ConsumerStats::incr(&self.stats.skipped, outcome::SKIPPED);
                warn!(
                    partition = msg.partition,
                    offset = msg.offset,
                    key = msg.key_str(),
                    field = e.field().unwrap_or("-"),
                    error = %e,
                    "消息无法解码，提交位点并跳过"
                );
                ConsumerState::Committing(msg)
            }
        }
    }

    async fn persist(&mut self, msg: ConsumerMessage, order: Order) -> ConsumerState {
        let order_uid = order.order_uid.clone();

        match self.service.ingest(order).await {
            Ok(()) => {
                ConsumerStats::incr(&self.stats.ingested, outcome::INGESTED);
                debug!(order_uid = %order_uid, offset = msg.offset, "订单已入库");
                ConsumerState::Committing(msg)
            }
            Err(e) => {
                ConsumerStats::incr(&self.stats.retried, outcome::RETRIED);
                error!(
                    order_uid = %order_uid,
                    partition = msg.partition,
                    offset = msg.offset,
                    code = e.error_code(),
                    error = %e,
                    "订单入库失败，不提交位点，稍后重试"
                );

                // 回退成功时重新拉取同一条消息；回退失败则直接重试手上这条
                let next = match self.source.rewind(&msg).await {
                    Ok(()) => ConsumerState::Fetching,
                    Err(rewind_err) => {
                        warn!(
                            offset = msg.offset,
                            error = %rewind_err,
                            "回退位点失败，将在本地重试该消息"
                        );
                        ConsumerState::Decoding(msg)
                    }
                };

                ConsumerState::BackoffSleep {
                    delay: self.backoff.ingest_error_delay,
                    next: Box::new(next),
                }
            }
        }
    }

    async fn commit(&mut self, msg: ConsumerMessage) -> ConsumerState {
        if let Err(e) = self.source.commit(&msg).await {
            ConsumerStats::incr(&self.stats.commit_errors, outcome::COMMIT_ERROR);
            warn!(
                partition = msg.partition,
                offset = msg.offset,
                error = %e,
                "提交位点失败，消息可能被重复投递"
            );
        }
        ConsumerState::Fetching
    }
}
