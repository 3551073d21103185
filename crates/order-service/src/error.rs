//! 订单服务错误类型定义
//!
//! 按失败的处理方式分类：解码/校验错误跳过消息，持久化错误重试，
//! 未找到错误原样返回调用方。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use order_shared::error::InfraError;
use serde_json::json;
use thiserror::Error;

/// 领域校验失败，携带首个违规字段的路径
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("字段 {field} 校验失败: {reason}")]
pub struct ValidationError {
    /// 点分路径，如 `payment.amount`、`items[0].rid`
    pub field: String,
    pub reason: String,
}

/// 消息体解码失败
///
/// 这类消息无论重试多少次都不会成功，消费端提交位点后跳过。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("JSON 格式错误: {0}")]
    InvalidJson(String),

    #[error("未知字段: {path}")]
    UnknownField { path: String },

    #[error("缺少字段: {path}")]
    MissingField { path: String },

    #[error("字段 {path} 类型错误，期望 {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    #[error("消息结构错误: {0}")]
    Malformed(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl DecodeError {
    /// 出错字段路径（能定位时）
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::UnknownField { path }
            | Self::MissingField { path }
            | Self::TypeMismatch { path, .. } => Some(path.as_str()),
            Self::Invalid(e) => Some(e.field.as_str()),
            Self::InvalidJson(_) | Self::Malformed(_) => None,
        }
    }
}

/// 订单服务错误类型
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("消息解码失败: {0}")]
    Decode(#[from] DecodeError),

    #[error("参数验证失败: {0}")]
    Validation(#[from] ValidationError),

    #[error("订单不存在: {order_uid}")]
    NotFound { order_uid: String },

    #[error("持久化失败: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl OrderError {
    pub fn not_found(order_uid: impl Into<String>) -> Self {
        Self::NotFound {
            order_uid: order_uid.into(),
        }
    }

    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Persistence(_) | Self::Infra(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应和日志）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "ORDER_NOT_FOUND",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Infra(e) => e.code(),
        }
    }

    /// 是否为可重试错误
    ///
    /// 解码和校验错误重试无意义；未找到是确定结果，同样不重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence(_) => true,
            Self::Infra(e) => e.is_retryable(),
            Self::Decode(_) | Self::Validation(_) | Self::NotFound { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Persistence(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Infra(e) => {
                tracing::error!(error = %e, "基础设施错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, OrderError>;
