//! 服务层
//!
//! 协调校验、仓储与缓存，对消费端和 HTTP 读接口提供同一组用例。

pub mod order_service;

pub use order_service::{OrderPage, OrderService, OrderUseCase, page_params};

#[cfg(test)]
pub use order_service::MockOrderUseCase;
