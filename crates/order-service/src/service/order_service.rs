//! 订单入库与查询服务
//!
//! ## 一致性约定
//!
//! - 入库：先校验，再在单个事务内写库，事务提交后才写缓存，缓存不会领先于数据库
//! - 查询：缓存优先，未命中回源数据库并回填；不缓存"不存在"的结果
//! - 预热：启动时加载最近的订单，失败由调用方记录后忽略
//!
//! 服务本身不持有可变状态，共享状态都在缓存（读写锁）和数据库（事务）中。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use order_shared::observability::metrics;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheStats, OrderCache};
use crate::error::{OrderError, Result};
use crate::models::Order;
use crate::repository::OrderRepositoryTrait;
use crate::validation::validate_order;

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: i64 = 20;
/// 最大分页大小
pub const MAX_PAGE_SIZE: i64 = 200;

/// 规范化分页参数
///
/// 非正的分页大小取默认值，超过上限的取上限；页码至少为 1。
pub fn page_params(page: i64, size: i64) -> (i64, i64) {
    let size = if size <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        size.min(MAX_PAGE_SIZE)
    };
    (page.max(1), size)
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: i64,
    /// 实际返回的页码（越界时已收敛到最后一页）
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// 订单用例接口
///
/// 消费端与 HTTP 层共同依赖此接口，并发调用无需额外协调。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderUseCase: Send + Sync {
    /// 校验并写入订单，成功后更新缓存
    async fn ingest(&self, order: Order) -> Result<()>;

    /// 缓存优先读取订单
    async fn get_by_id(&self, order_uid: &str) -> Result<Order>;

    /// 将最近的 `limit` 个订单加载进缓存，返回加载数量
    async fn warm_cache(&self, limit: i64) -> Result<usize>;

    /// 按创建时间倒序分页
    async fn list_page(&self, page: i64, size: i64) -> Result<OrderPage>;

    /// 缓存统计
    fn cache_stats(&self) -> (CacheStats, usize);
}

/// 订单服务
pub struct OrderService<R, C>
where
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    repo: Arc<R>,
    cache: Arc<C>,
}

impl<R, C> OrderService<R, C>
where
    R: OrderRepositoryTrait,
    C: OrderCache,
{
    pub fn new(repo: Arc<R>, cache: Arc<C>) -> Self {
        Self { repo, cache }
    }
}

#[async_trait]
impl<R, C> OrderUseCase for OrderService<R, C>
where
    R: OrderRepositoryTrait + 'static,
    C: OrderCache + 'static,
{
    #[instrument(skip(self, order), fields(order_uid = %order.order_uid))]
    async fn ingest(&self, mut order: Order) -> Result<()> {
        // 绕过解码器直接构造订单的调用方同样要经过校验
        validate_order(&order)?;
        // 缓存中的值必须与存储读回的值一致
        order.truncate_to_store_precision();

        let started = Instant::now();
        let result = self.repo.upsert(&order).await;
        metrics::record_ingest_duration(started.elapsed(), result.is_ok());
        result?;

        self.cache.set(order);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, order_uid: &str) -> Result<Order> {
        if order_uid.trim().is_empty() {
            return Err(OrderError::not_found(order_uid));
        }

        if let Some(order) = self.cache.get(order_uid) {
            debug!("缓存命中");
            return Ok(order);
        }

        let order = self.repo.get_by_id(order_uid).await?;
        self.cache.set(order.clone());
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn warm_cache(&self, limit: i64) -> Result<usize> {
        if limit <= 0 {
            return Ok(0);
        }

        let orders = self.repo.list_latest(limit).await?;
        let loaded = orders.len();
        self.cache.bulk_set(orders);

        info!(loaded, limit, "缓存预热完成");
        Ok(loaded)
    }

    #[instrument(skip(self))]
    async fn list_page(&self, page: i64, size: i64) -> Result<OrderPage> {
        let (page, page_size) = page_params(page, size);

        let total = self.repo.count_orders().await?;
        if total == 0 {
            return Ok(OrderPage {
                orders: vec![],
                total: 0,
                page: 1,
                page_size,
                total_pages: 0,
            });
        }

        let total_pages = (total + page_size - 1) / page_size;
        let page = page.min(total_pages);
        let offset = (page - 1) * page_size;

        let uids = self.repo.list_order_uids(page_size, offset).await?;

        let mut orders = Vec::with_capacity(uids.len());
        for uid in uids {
            // 与并发写入竞争导致的单条读取失败不影响整页
            match self.repo.get_by_id(&uid).await {
                Ok(order) => orders.push(order),
                Err(e) => warn!(order_uid = %uid, error = %e, "分页读取订单失败，已跳过"),
            }
        }

        Ok(OrderPage {
            orders,
            total,
            page,
            page_size,
            total_pages,
        })
    }

    fn cache_stats(&self) -> (CacheStats, usize) {
        (self.cache.stats(), self.cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryOrderCache;
    use crate::repository::MockOrderRepositoryTrait;
    use crate::test_support::sample_order;

    type TestService = OrderService<MockOrderRepositoryTrait, MemoryOrderCache>;

    fn service(repo: MockOrderRepositoryTrait) -> (TestService, Arc<MemoryOrderCache>) {
        let cache = Arc::new(MemoryOrderCache::new());
        (OrderService::new(Arc::new(repo), cache.clone()), cache)
    }

    #[test]
    fn test_page_params() {
        assert_eq!(page_params(0, 0), (1, 20));
        assert_eq!(page_params(-3, -1), (1, 20));
        assert_eq!(page_params(2, 10), (2, 10));
        assert_eq!(page_params(1, 1), (1, 1));
        assert_eq!(page_params(1, 500), (1, 200));
    }

    #[tokio::test]
    async fn test_ingest_writes_cache_after_store() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_upsert()
            .withf(|order| order.order_uid == "uid-1")
            .times(1)
            .returning(|_| Ok(()));

        let (svc, cache) = service(repo);
        svc.ingest(sample_order("uid-1")).await.unwrap();

        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_truncates_timestamp_before_store_and_cache() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_upsert()
            .withf(|order| order.date_created.timestamp_subsec_nanos() == 123_456_000)
            .times(1)
            .returning(|_| Ok(()));

        let (svc, cache) = service(repo);
        let mut order = sample_order("uid-1");
        order.date_created = chrono::DateTime::parse_from_rfc3339("2021-11-26T06:22:19.123456789Z")
            .unwrap()
            .with_timezone(&chrono::Utc);

        svc.ingest(order).await.unwrap();

        let cached = cache.get("uid-1").unwrap();
        assert_eq!(cached.date_created.timestamp_subsec_nanos(), 123_456_000);
    }

    #[tokio::test]
    async fn test_ingest_failure_leaves_cache_untouched() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_upsert()
            .times(1)
            .returning(|_| Err(sqlx::Error::PoolTimedOut.into()));

        let (svc, cache) = service(repo);
        let err = svc.ingest(sample_order("uid-1")).await.unwrap_err();

        assert!(matches!(err, OrderError::Persistence(_)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_rejects_invalid_order_without_store_call() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_upsert().never();

        let (svc, cache) = service(repo);
        let mut order = sample_order("uid-1");
        order.payment.amount = -5;

        let err = svc.ingest(order).await.unwrap_err();
        assert!(matches!(err, OrderError::Validation(ref v) if v.field == "payment.amount"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_by_id_backfills_cache_once() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_get_by_id()
            .withf(|uid| uid == "uid-1")
            .times(1)
            .returning(|uid| Ok(sample_order(uid)));

        let (svc, cache) = service(repo);

        let first = svc.get_by_id("uid-1").await.unwrap();
        let second = svc.get_by_id("uid-1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn test_get_by_id_not_found_is_not_cached() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_get_by_id()
            .times(2)
            .returning(|uid| Err(OrderError::not_found(uid)));

        let (svc, cache) = service(repo);

        assert!(svc.get_by_id("ghost").await.unwrap_err().is_not_found());
        assert!(svc.get_by_id("ghost").await.unwrap_err().is_not_found());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_get_by_id_blank_uid() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_get_by_id().never();

        let (svc, _) = service(repo);
        assert!(svc.get_by_id(" ").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_warm_cache_non_positive_limit() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_list_latest().never();

        let (svc, _) = service(repo);
        assert_eq!(svc.warm_cache(0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_warm_cache_propagates_store_error() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_list_latest()
            .returning(|_| Err(sqlx::Error::PoolTimedOut.into()));

        let (svc, cache) = service(repo);
        assert!(svc.warm_cache(10).await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_list_page_empty_store() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_count_orders().returning(|| Ok(0));
        repo.expect_list_order_uids().never();

        let (svc, _) = service(repo);
        let page = svc.list_page(3, 10).await.unwrap();

        assert!(page.orders.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.page, 1);
    }

    #[tokio::test]
    async fn test_list_page_skips_unresolvable_uid() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_count_orders().returning(|| Ok(3));
        repo.expect_list_order_uids()
            .withf(|limit, offset| *limit == 20 && *offset == 0)
            .returning(|_, _| Ok(vec!["a".into(), "gone".into(), "c".into()]));
        repo.expect_get_by_id().returning(|uid| {
            if uid == "gone" {
                Err(OrderError::not_found(uid))
            } else {
                Ok(sample_order(uid))
            }
        });

        let (svc, _) = service(repo);
        let page = svc.list_page(1, 0).await.unwrap();

        let uids: Vec<_> = page.orders.iter().map(|o| o.order_uid.as_str()).collect();
        assert_eq!(uids, ["a", "c"]);
        assert_eq!(page.total, 3);
        assert_eq!(page.page_size, 20);
    }

    #[tokio::test]
    async fn test_list_page_count_error_propagates() {
        let mut repo = MockOrderRepositoryTrait::new();
        repo.expect_count_orders()
            .returning(|| Err(sqlx::Error::PoolTimedOut.into()));

        let (svc, _) = service(repo);
        assert!(svc.list_page(1, 10).await.unwrap_err().is_retryable());
    }
}
