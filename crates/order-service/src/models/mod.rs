//! 订单服务领域模型

pub mod order;

pub use order::{Delivery, Item, Order, Payment};
