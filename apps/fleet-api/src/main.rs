//! 设备集群编排服务入口。

use fleet_api::{AppState, serve};
use fleet_config::AppConfig;
use fleet_gateway::{DeviceConnector, SimulatedConnector, TcpJsonConfig, TcpJsonConnector};
use fleet_storage::{InMemoryKvStore, KvStore, RedisKvStore};
use fleet_telemetry::init_tracing;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    // 未配置 Redis 时任务与快照仅保存在进程内
    let kv: Arc<dyn KvStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisKvStore::connect(url, "fleet")?),
        None => Arc::new(InMemoryKvStore::new()),
    };
    let connector: Arc<dyn DeviceConnector> = if config.simulate {
        Arc::new(SimulatedConnector::new())
    } else {
        Arc::new(TcpJsonConnector::new(TcpJsonConfig::default()))
    };

    let state = AppState::new(&config, connector, kv);

    info!(
        target: "fleet.api",
        addr = %config.http_addr,
        redis = config.redis_url.is_some(),
        simulate = config.simulate,
        "http_server_starting"
    );
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    serve(listener, state, shutdown_signal()).await?;
    info!(target: "fleet.api", "http_server_stopped");
    Ok(())
}

/// Ctrl+C 后停止接收新请求，等待进行中的请求结束。
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: "fleet.api", "shutdown_signal_received"),
        Err(err) => {
            warn!(target: "fleet.api", error = %err, "shutdown_signal_unavailable");
            std::future::pending::<()>().await;
        }
    }
}
