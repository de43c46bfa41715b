//! 设备集群编排 HTTP API。
//!
//! `AppState` 持有各能力模块的共享实例；`build_app` 组装路由与中间件，
//! 供二进制入口与集成测试共用。

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod utils;

use axum::{Router, middleware::from_fn};
use fleet_config::AppConfig;
use fleet_control::{DeviceControlService, DeviceRegistry};
use fleet_gateway::{DeviceConnector, RemoteGateway, RetryPolicy};
use fleet_jobs::{JobManager, JobStore};
use fleet_session::{SessionConfig, SessionManager};
use fleet_status::{FleetAggregator, StatusCache};
use fleet_storage::{DeviceStore, InMemoryDeviceStore, KvStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// 功率扫描默认稳定等待时长。
pub const DEFAULT_SWEEP_SETTLE: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub registry: DeviceRegistry,
    pub control: DeviceControlService,
    pub gateway: Arc<RemoteGateway>,
    pub cache: Arc<StatusCache>,
    pub fleet: Arc<FleetAggregator>,
    pub jobs: Arc<JobManager>,
}

impl AppState {
    /// 按运行配置装配各能力模块。
    pub fn new(config: &AppConfig, connector: Arc<dyn DeviceConnector>, kv: Arc<dyn KvStore>) -> Self {
        let devices: Arc<dyn DeviceStore> = Arc::new(InMemoryDeviceStore::new());
        let sessions = Arc::new(SessionManager::new(SessionConfig {
            safety_margin: Duration::from_secs(config.token_margin_seconds),
        }));
        let policy = RetryPolicy {
            max_attempts: config.retry_max_attempts,
            initial_backoff: Duration::from_millis(config.retry_initial_backoff_ms),
            multiplier: config.retry_multiplier,
            max_backoff: Duration::from_millis(config.retry_max_backoff_ms),
            call_timeout: Duration::from_millis(config.call_timeout_ms),
        };
        let gateway = Arc::new(RemoteGateway::new(connector, sessions, policy));
        let cache = Arc::new(StatusCache::new(
            devices.clone(),
            gateway.clone(),
            kv.clone(),
            Duration::from_secs(config.status_ttl_seconds),
        ));
        let fleet = Arc::new(FleetAggregator::new(
            devices.clone(),
            cache.clone(),
            kv.clone(),
            Duration::from_secs(config.summary_ttl_seconds),
        ));
        let jobs = Arc::new(JobManager::new(JobStore::new(
            kv,
            Some(Duration::from_secs(config.job_ttl_seconds)),
        )));
        Self {
            registry: DeviceRegistry::new(devices.clone(), gateway.clone(), cache.clone()),
            control: DeviceControlService::new(devices, gateway.clone(), cache.clone()),
            gateway,
            cache,
            fleet,
            jobs,
        }
    }
}

/// 组装完整应用：路由、请求追踪 ID 与 HTTP trace。
pub fn build_app(state: AppState) -> Router {
    routes::create_api_router().with_state(state).layer(
        ServiceBuilder::new()
            .layer(from_fn(middleware::request_context))
            .layer(TraceLayer::new_for_http()),
    )
}

/// 在 `listener` 上提供服务，直到 `shutdown` 完成；进行中的请求结束后关闭全部设备通道。
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let gateway = state.gateway.clone();
    let result = axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown)
        .await;
    gateway.close_all().await;
    result
}
