//! 领域校验
//!
//! 字段级规则以 `validator` 派生宏声明在模型上，这里提供自定义规则函数，
//! 并把 `validator` 的嵌套错误树压平为单个带路径的 [`ValidationError`]。
//! 解码器和服务层入库前都调用 [`validate_order`]。

use std::borrow::Cow;

use validator::{Validate, ValidateEmail, ValidationErrors, ValidationErrorsKind};

use crate::error::ValidationError;
use crate::models::Order;

/// 去除首尾空白后不能为空
pub fn non_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank").with_message(Cow::Borrowed("不能为空")));
    }
    Ok(())
}

/// 为空或者是合法的邮箱地址
pub fn email_or_empty(value: &str) -> Result<(), validator::ValidationError> {
    if value.is_empty() || value.validate_email() {
        return Ok(());
    }
    Err(validator::ValidationError::new("email").with_message(Cow::Borrowed("邮箱格式不正确")))
}

/// 校验整个订单聚合
///
/// 存在多处违规时按字段路径排序后返回第一处，同一输入的报错稳定。
pub fn validate_order(order: &Order) -> Result<(), ValidationError> {
    match order.validate() {
        Ok(()) => Ok(()),
        Err(errors) => Err(first_violation(&errors)),
    }
}

fn first_violation(errors: &ValidationErrors) -> ValidationError {
    let mut violations = Vec::new();
    flatten("", errors, &mut violations);
    violations.sort();

    violations
        .into_iter()
        .next()
        .map(|(field, reason)| ValidationError { field, reason })
        .unwrap_or_else(|| ValidationError {
            field: String::new(),
            reason: "校验失败".to_string(),
        })
}

/// 深度优先展开错误树，路径形如 `payment.amount`、`items[2].rid`
fn flatten(prefix: &str, errors: &ValidationErrors, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };

        match kind {
            ValidationErrorsKind::Field(list) => {
                for err in list {
                    let reason = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    out.push((path.clone(), reason));
                }
            }
            ValidationErrorsKind::Struct(inner) => flatten(&path, inner, out),
            ValidationErrorsKind::List(entries) => {
                for (idx, inner) in entries {
                    flatten(&format!("{path}[{idx}]"), inner, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_order;

    #[test]
    fn test_valid_order_passes() {
        assert!(validate_order(&sample_order("uid-1")).is_ok());
    }

    #[test]
    fn test_blank_uid_rejected() {
        let mut order = sample_order("uid-1");
        order.order_uid = "   ".to_string();

        let err = validate_order(&order).unwrap_err();
        assert_eq!(err.field, "order_uid");
        assert_eq!(err.reason, "不能为空");
    }

    #[test]
    fn test_uid_too_long() {
        let order = sample_order(&"x".repeat(129));
        let err = validate_order(&order).unwrap_err();
        assert_eq!(err.field, "order_uid");
    }

    #[test]
    fn test_negative_amount_reports_nested_path() {
        let mut order = sample_order("uid-1");
        order.payment.amount = -1;

        let err = validate_order(&order).unwrap_err();
        assert_eq!(err.field, "payment.amount");
        assert_eq!(err.reason, "不能为负数");
    }

    #[test]
    fn test_item_violation_reports_index() {
        let mut order = sample_order("uid-1");
        let mut second = order.items[0].clone();
        second.rid = String::new();
        order.items.push(second);

        let err = validate_order(&order).unwrap_err();
        assert_eq!(err.field, "items[1].rid");
    }

    #[test]
    fn test_first_violation_is_stable() {
        let mut order = sample_order("uid-1");
        order.payment.currency = String::new();
        order.delivery.city = String::new();

        // delivery.city 按字典序排在 payment.currency 之前
        for _ in 0..5 {
            assert_eq!(validate_order(&order).unwrap_err().field, "delivery.city");
        }
    }

    #[test]
    fn test_empty_items_allowed() {
        let mut order = sample_order("uid-1");
        order.items.clear();
        assert!(validate_order(&order).is_ok());
    }

    #[test]
    fn test_email_rules() {
        assert!(email_or_empty("").is_ok());
        assert!(email_or_empty("test@gmail.com").is_ok());
        assert!(email_or_empty("not-an-email").is_err());

        let mut order = sample_order("uid-1");
        order.delivery.email = "broken".to_string();
        assert_eq!(validate_order(&order).unwrap_err().field, "delivery.email");
    }

    #[test]
    fn test_transaction_need_not_match_uid() {
        let mut order = sample_order("uid-1");
        order.payment.transaction = "something-else".to_string();
        assert!(validate_order(&order).is_ok());
    }
}
