//! 订单服务入口
//!
//! 启动顺序：配置 → 可观测性 → 数据库与迁移 → 仓储/缓存/服务 → 缓存预热
//! → 消费者任务 → HTTP 服务。收到关闭信号后先停止 HTTP，再通知消费者退出。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use order_shared::{
    backoff::FixedBackoff, config::AppConfig, database::Database, kafka::KafkaMessageSource,
    observability,
};
use sqlx::migrate::Migrator;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use order_service::{
    MemoryOrderCache, OrderConsumer, OrderService, OrderUseCase, PgOrderRepository,
    http::{AppState, router},
};

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置
    let config = AppConfig::load("order-service").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });

    // 2. 可观测性
    let _guard = observability::init(&config.observability, &config.service_name).await?;

    info!("Starting order-service...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 数据库连接与迁移
    let db = Database::connect(&config.database).await?;
    db.run_migrations(&MIGRATOR).await?;

    // 4. 仓储、缓存、服务
    let repo = Arc::new(PgOrderRepository::new(db.pool().clone()));
    let cache = Arc::new(MemoryOrderCache::new());
    let service: Arc<dyn OrderUseCase> = Arc::new(OrderService::new(repo, cache));

    // 5. 缓存预热失败不阻塞启动
    match service.warm_cache(config.cache.warm_limit).await {
        Ok(loaded) => info!(loaded, "Cache warmed"),
        Err(e) => warn!(error = %e, "Cache warmup failed, continuing with cold cache"),
    }

    // 6. 消费者
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let source = KafkaMessageSource::new(&config.kafka)?;
    let consumer = OrderConsumer::new(
        source,
        service.clone(),
        FixedBackoff::from(&config.consumer),
        shutdown_rx,
    );
    let consumer_stats = consumer.stats();
    let consumer_handle = tokio::spawn(consumer.run());

    // 7. HTTP 服务
    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, router(AppState::new(service)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 8. 通知消费者退出并等待
    let _ = shutdown_tx.send(true);
    let timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    match tokio::time::timeout(timeout, consumer_handle).await {
        Ok(Ok(stats)) => info!(?stats, "Consumer stopped"),
        Ok(Err(e)) => error!(error = %e, "Consumer task failed"),
        Err(_) => warn!(
            timeout_secs = timeout.as_secs(),
            stats = ?consumer_stats.snapshot(),
            "Consumer did not stop in time"
        ),
    }

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
