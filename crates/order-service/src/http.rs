//! HTTP 读接口
//!
//! 只提供 JSON 查询：单个订单、分页列表、缓存统计与健康检查。

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::Method,
    middleware,
    routing::get,
};
use order_shared::observability::middleware::http_tracing;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::error::Result;
use crate::models::Order;
use crate::service::OrderUseCase;

/// 共享应用状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn OrderUseCase>,
}

impl AppState {
    pub fn new(service: Arc<dyn OrderUseCase>) -> Self {
        Self { service }
    }
}

/// 分页查询参数，缺省或非法值由服务层规范化
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

/// 分页响应
#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// 缓存统计响应
#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/order/{order_uid}", get(get_order))
        .route("/orders", get(list_orders))
        .route("/cache/stats", get(cache_stats))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any),
        )
        .layer(middleware::from_fn(http_tracing))
        .with_state(state)
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// GET /order/{order_uid}
async fn get_order(
    State(state): State<AppState>,
    Path(order_uid): Path<String>,
) -> Result<Json<Order>> {
    let order = state.service.get_by_id(order_uid.trim()).await?;
    Ok(Json(order))
}

/// GET /orders?page=&size=
async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PageResponse<Order>>> {
    let page = state
        .service
        .list_page(params.page.unwrap_or(1), params.size.unwrap_or(0))
        .await?;

    Ok(Json(PageResponse {
        items: page.orders,
        total: page.total,
        page: page.page,
        page_size: page.page_size,
        total_pages: page.total_pages,
    }))
}

/// GET /cache/stats
async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let (stats, entries) = state.service.cache_stats();
    Json(CacheStatsResponse {
        hits: stats.hits,
        misses: stats.misses,
        entries,
        hit_rate: stats.hit_rate(),
    })
}
