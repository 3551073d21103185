//! 数据仓储层

mod order_repo;
mod traits;

pub use order_repo::PgOrderRepository;
pub use traits::OrderRepositoryTrait;

#[cfg(test)]
pub use traits::MockOrderRepositoryTrait;
