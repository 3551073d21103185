//! 订单消息解码器
//!
//! 解码分三步：
//! 1. 解析为 JSON 树；
//! 2. 按显式声明的结构逐层比对，拒绝未知字段、缺失字段和类型不符的字段；
//! 3. 反序列化为 [`Order`] 并执行领域校验。
//!
//! 任何一步失败都返回 [`DecodeError`]，不产生部分解码结果。

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::models::Order;
use crate::validation::validate_order;

/// 标量字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Int,
    /// 落在 i32 范围内的整数
    Int32,
    /// RFC 3339 时间字符串
    Timestamp,
}

impl Kind {
    fn expected(self) -> &'static str {
        match self {
            Kind::Str => "string",
            Kind::Int => "integer",
            Kind::Int32 => "32-bit integer",
            Kind::Timestamp => "RFC 3339 timestamp string",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Kind::Str => value.is_string(),
            Kind::Int => value.as_i64().is_some(),
            Kind::Int32 => value.as_i64().is_some_and(|n| i32::try_from(n).is_ok()),
            Kind::Timestamp => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
        }
    }
}

/// 消息结构描述
#[derive(Debug)]
enum Schema {
    Scalar(Kind),
    Object(&'static [(&'static str, Schema)]),
    Array(&'static Schema),
}

const STR: Schema = Schema::Scalar(Kind::Str);
const INT: Schema = Schema::Scalar(Kind::Int);
const INT32: Schema = Schema::Scalar(Kind::Int32);

const DELIVERY: Schema = Schema::Object(&[
    ("name", STR),
    ("phone", STR),
    ("zip", STR),
    ("city", STR),
    ("address", STR),
    ("region", STR),
    ("email", STR),
]);

const PAYMENT: Schema = Schema::Object(&[
    ("transaction", STR),
    ("request_id", STR),
    ("currency", STR),
    ("provider", STR),
    ("amount", INT),
    ("payment_dt", INT),
    ("bank", STR),
    ("delivery_cost", INT),
    ("goods_total", INT),
    ("custom_fee", INT),
]);

const ITEM: Schema = Schema::Object(&[
    ("chrt_id", INT),
    ("track_number", STR),
    ("price", INT),
    ("rid", STR),
    ("name", STR),
    ("sale", INT32),
    ("size", STR),
    ("total_price", INT),
    ("nm_id", INT),
    ("brand", STR),
    ("status", INT32),
]);

static ORDER_SCHEMA: Schema = Schema::Object(&[
    ("order_uid", STR),
    ("track_number", STR),
    ("entry", STR),
    ("delivery", DELIVERY),
    ("payment", PAYMENT),
    ("items", Schema::Array(&ITEM)),
    ("locale", STR),
    ("internal_signature", STR),
    ("customer_id", STR),
    ("delivery_service", STR),
    ("shardkey", STR),
    ("sm_id", INT32),
    ("date_created", Schema::Scalar(Kind::Timestamp)),
    ("oof_shard", STR),
]);

/// 将原始消息体解码为经过校验的订单
pub fn decode(bytes: &[u8]) -> Result<Order, DecodeError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

    check_schema(&value)?;

    let mut order: Order =
        serde_json::from_value(value).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    order.truncate_to_store_precision();

    validate_order(&order)?;
    Ok(order)
}

/// 只做结构比对，不做反序列化和领域校验
pub fn check_schema(value: &Value) -> Result<(), DecodeError> {
    walk(value, &ORDER_SCHEMA, "")
}

fn walk(value: &Value, schema: &Schema, path: &str) -> Result<(), DecodeError> {
    match schema {
        Schema::Scalar(kind) => {
            if kind.matches(value) {
                Ok(())
            } else {
                Err(mismatch(path, kind.expected()))
            }
        }
        Schema::Object(fields) => {
            let object = value.as_object().ok_or_else(|| mismatch(path, "object"))?;
            walk_object(object, fields, path)
        }
        Schema::Array(element) => {
            let array = value.as_array().ok_or_else(|| mismatch(path, "array"))?;
            for (idx, entry) in array.iter().enumerate() {
                walk(entry, element, &format!("{path}[{idx}]"))?;
            }
            Ok(())
        }
    }
}

fn walk_object(
    object: &Map<String, Value>,
    fields: &[(&'static str, Schema)],
    path: &str,
) -> Result<(), DecodeError> {
    // 先报未知字段：上游新增字段是最常见的不兼容来源
    if let Some(key) = object
        .keys()
        .find(|key| !fields.iter().any(|(name, _)| *name == key.as_str()))
    {
        return Err(DecodeError::UnknownField {
            path: child(path, key),
        });
    }

    for (name, schema) in fields {
        let field_path = child(path, name);
        let value = object
            .get(*name)
            .ok_or_else(|| DecodeError::MissingField {
                path: field_path.clone(),
            })?;
        walk(value, schema, &field_path)?;
    }
    Ok(())
}

fn child(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn mismatch(path: &str, expected: &'static str) -> DecodeError {
    DecodeError::TypeMismatch {
        path: if path.is_empty() { "$".to_string() } else { path.to_string() },
        expected,
    }
}
