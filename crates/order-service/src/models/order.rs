//! 订单聚合定义
//!
//! 订单以 `order_uid` 为聚合根：配送信息与支付信息与订单头一一对应，
//! 商品明细为一对多且没有独立稳定的标识，每次写入整体替换。
//!
//! 字段名即 Kafka 消息与 HTTP 响应中的 JSON 键。

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation::{email_or_empty, non_blank};

/// 订单聚合根
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Order {
    /// 订单唯一标识
    #[validate(
        custom(function = "non_blank"),
        length(max = 128, code = "too_long", message = "超过 128 个字符")
    )]
    pub order_uid: String,
    #[validate(custom(function = "non_blank"))]
    pub track_number: String,
    #[validate(custom(function = "non_blank"))]
    pub entry: String,
    #[validate(nested)]
    pub delivery: Delivery,
    #[validate(nested)]
    pub payment: Payment,
    /// 商品明细，按原始顺序排列，可以为空
    #[validate(nested)]
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    #[validate(custom(function = "non_blank"))]
    pub customer_id: String,
    pub delivery_service: String,
    #[serde(rename = "shardkey")]
    pub shard_key: String,
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

/// 配送信息（与订单一对一）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, sqlx::FromRow)]
pub struct Delivery {
    #[validate(custom(function = "non_blank"))]
    pub name: String,
    #[validate(custom(function = "non_blank"))]
    pub phone: String,
    pub zip: String,
    #[validate(custom(function = "non_blank"))]
    pub city: String,
    #[validate(custom(function = "non_blank"))]
    pub address: String,
    pub region: String,
    #[validate(custom(function = "email_or_empty"))]
    pub email: String,
}

/// 支付信息（与订单一对一）
///
/// 金额字段均为最小货币单位的整数。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, sqlx::FromRow)]
pub struct Payment {
    #[validate(custom(function = "non_blank"))]
    pub transaction: String,
    pub request_id: String,
    #[validate(custom(function = "non_blank"))]
    pub currency: String,
    #[validate(custom(function = "non_blank"))]
    pub provider: String,
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub amount: i64,
    /// 支付时间（unix 秒）
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub payment_dt: i64,
    pub bank: String,
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub delivery_cost: i64,
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub goods_total: i64,
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub custom_fee: i64,
}

/// 商品明细
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, sqlx::FromRow)]
pub struct Item {
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub chrt_id: i64,
    #[validate(custom(function = "non_blank"))]
    pub track_number: String,
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub price: i64,
    #[validate(custom(function = "non_blank"))]
    pub rid: String,
    #[validate(custom(function = "non_blank"))]
    pub name: String,
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub sale: i32,
    pub size: String,
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub total_price: i64,
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub nm_id: i64,
    pub brand: String,
    #[validate(range(min = 0, code = "negative", message = "不能为负数"))]
    pub status: i32,
}

/// PostgreSQL TIMESTAMPTZ 的小数秒精度（微秒）
pub const STORE_SUBSEC_DIGITS: u16 = 6;

impl Order {
    /// 商品数量
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// 将时间截断到存储精度
    ///
    /// 入库与写缓存前都要截断，否则缓存中的纳秒时间与存储读回的值不一致。
    pub fn truncate_to_store_precision(&mut self) {
        self.date_created = self.date_created.trunc_subsecs(STORE_SUBSEC_DIGITS);
    }
}
