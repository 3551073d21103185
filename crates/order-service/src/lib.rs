//! 订单入库与查询服务
//!
//! 从 Kafka 消费订单消息，事务性地写入 PostgreSQL，并通过缓存旁路提供查询。
//!
//! ## 模块结构
//!
//! - `models`: 订单聚合定义
//! - `validation`: 领域校验规则
//! - `decoder`: 严格的消息解码
//! - `cache`: 进程内订单缓存
//! - `repository`: 数据库仓储层
//! - `service`: 入库与查询用例
//! - `consumer`: 拉取、解码、入库、提交的消费状态机
//! - `http`: JSON 读接口
//! - `generator`: 演示订单生成

pub mod cache;
pub mod consumer;
pub mod decoder;
pub mod error;
pub mod generator;
pub mod http;
pub mod models;
pub mod repository;
pub mod service;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{CacheStats, MemoryOrderCache, OrderCache};
pub use consumer::{ConsumerState, ConsumerStatsSnapshot, OrderConsumer};
pub use error::{DecodeError, OrderError, Result, ValidationError};
pub use models::*;
pub use repository::{OrderRepositoryTrait, PgOrderRepository};
pub use service::{OrderPage, OrderService, OrderUseCase};
