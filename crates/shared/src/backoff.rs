//! 固定延迟退避策略
//!
//! 消费循环在拉取失败与入库失败两条路径上都采用固定延迟后重试：
//! 不做指数增长、不加抖动、没有最大重试次数。延迟值作为参数注入，
//! 测试中传入 `Duration::ZERO` 即可跳过真实等待。

use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::config::ConsumerConfig;

// ---------------------------------------------------------------------------
// FixedBackoff：退避策略配置
// ---------------------------------------------------------------------------

/// 两条失败路径各自的固定退避延迟
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    /// 拉取消息失败（非关闭导致）后的等待时间
    pub fetch_error_delay: Duration,
    /// 入库失败后的等待时间，等待结束后重新拉取同一条消息
    pub ingest_error_delay: Duration,
}

impl Default for FixedBackoff {
    /// 默认策略：拉取失败等待 500ms，入库失败等待 1s
    fn default() -> Self {
        Self {
            fetch_error_delay: Duration::from_millis(500),
            ingest_error_delay: Duration::from_secs(1),
        }
    }
}

impl FixedBackoff {
    /// 两条路径使用同一延迟
    pub const fn uniform(delay: Duration) -> Self {
        Self {
            fetch_error_delay: delay,
            ingest_error_delay: delay,
        }
    }

    /// 不等待，用于测试
    pub const fn none() -> Self {
        Self::uniform(Duration::ZERO)
    }
}

impl From<&ConsumerConfig> for FixedBackoff {
    fn from(config: &ConsumerConfig) -> Self {
        Self {
            fetch_error_delay: config.fetch_error_backoff(),
            ingest_error_delay: config.ingest_error_backoff(),
        }
    }
}

// ---------------------------------------------------------------------------
// sleep_or_shutdown：可被关闭信号打断的等待
// ---------------------------------------------------------------------------

/// 等待结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    /// 完整等待了指定时长
    Elapsed,
    /// 等待期间收到关闭信号
    Shutdown,
}

/// 等待 `delay`，期间若关闭信号变为 `true` 则立即返回
///
/// 关闭信号发送端被丢弃时视为关闭，避免消费循环在无人控制时空转。
pub async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> SleepOutcome {
    if *shutdown.borrow() {
        return SleepOutcome::Shutdown;
    }
    if delay.is_zero() {
        return SleepOutcome::Elapsed;
    }

    debug!(delay_ms = delay.as_millis() as u64, "进入退避等待");

    tokio::select! {
        biased;

        changed = shutdown.changed() => {
            if changed.is_err() || *shutdown.borrow() {
                SleepOutcome::Shutdown
            } else {
                // 信号被复位为 false，视为等待结束
                SleepOutcome::Elapsed
            }
        }

        _ = tokio::time::sleep(delay) => SleepOutcome::Elapsed,
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
