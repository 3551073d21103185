//! 单元测试共用的样例数据

use crate::models::Order;

pub const SAMPLE_ORDER_JSON: &str = include_str!("../tests/fixtures/order.json");

/// 以样例消息为模板构造订单，替换 `order_uid`
pub fn sample_order(order_uid: &str) -> Order {
    let mut order: Order = serde_json::from_str(SAMPLE_ORDER_JSON).expect("fixture is valid");
    order.order_uid = order_uid.to_string();
    order
}
