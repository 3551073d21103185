//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，便于 mock 测试和内存替身。

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Order;

/// 订单仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepositoryTrait: Send + Sync {
    /// 在单个事务内整体写入订单聚合，任何一步失败都整体回滚
    async fn upsert(&self, order: &Order) -> Result<()>;

    /// 按订单号读取完整聚合，不存在时返回 `OrderError::NotFound`
    async fn get_by_id(&self, order_uid: &str) -> Result<Order>;

    /// 按创建时间倒序读取最多 `limit` 个订单，单个订单读取失败时跳过
    async fn list_latest(&self, limit: i64) -> Result<Vec<Order>>;

    /// 按创建时间倒序分页列出订单号
    async fn list_order_uids(&self, limit: i64, offset: i64) -> Result<Vec<String>>;

    async fn count_orders(&self) -> Result<i64>;
}
