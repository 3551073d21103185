//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ObservabilityConfig;

/// 消费结果标签取值
pub mod outcome {
    /// 入库成功并已提交
    pub const INGESTED: &str = "ingested";
    /// 解码或校验失败，提交后跳过
    pub const SKIPPED: &str = "skipped";
    /// 入库失败，等待重试
    pub const RETRIED: &str = "retried";
    /// 拉取失败
    pub const FETCH_ERROR: &str = "fetch_error";
    /// 提交失败（仅记录）
    pub const COMMIT_ERROR: &str = "commit_error";
}

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig, service_name: &str) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册指标描述，出现在 /metrics 的 HELP 注释中
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("http_requests_total", "Total number of HTTP requests");
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );

    metrics::describe_counter!(
        "orders_consumed_total",
        "Total number of order messages handled by the consumer, by outcome"
    );
    metrics::describe_histogram!(
        "orders_ingest_duration_seconds",
        "Order ingest duration in seconds"
    );

    metrics::describe_counter!("order_cache_hits_total", "Total number of order cache hits");
    metrics::describe_counter!(
        "order_cache_misses_total",
        "Total number of order cache misses"
    );
    metrics::describe_gauge!("order_cache_entries", "Number of orders held in the cache");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录 HTTP 请求
#[inline]
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str.clone()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status_str
    )
    .record(duration_secs);
}

/// 记录一条消息的消费结果，取值见 [`outcome`]
#[inline]
pub fn record_consumed(outcome: &'static str) {
    metrics::counter!("orders_consumed_total", "outcome" => outcome).increment(1);
}

/// 记录一次入库耗时
#[inline]
pub fn record_ingest_duration(elapsed: Duration, success: bool) {
    metrics::histogram!(
        "orders_ingest_duration_seconds",
        "success" => success.to_string()
    )
    .record(elapsed.as_secs_f64());
}

/// 记录缓存命中
#[inline]
pub fn record_cache_hit() {
    metrics::counter!("order_cache_hits_total").increment(1);
}

/// 记录缓存未命中
#[inline]
pub fn record_cache_miss() {
    metrics::counter!("order_cache_misses_total").increment(1);
}

/// 更新缓存条目数
#[inline]
pub fn set_cache_entries(entries: usize) {
    metrics::gauge!("order_cache_entries").set(entries as f64);
}
