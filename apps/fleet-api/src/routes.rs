//! 路由定义
//!
//! - 健康检查与指标：/health, /metrics
//! - 设备注册表：/devices, /devices/:device_id
//! - 状态查询：/devices/:device_id/status, /fleet/status
//! - 设备控制：/devices/:device_id/{power-target,cooling-mode,reboot}
//! - 异步任务：/jobs/batch, /jobs/power-sweep, /jobs/:job_id

use crate::AppState;
use crate::handlers::*;
use axum::{
    Router,
    routing::{delete, get, post},
};

pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/devices", get(list_devices).post(register_device))
        .route("/devices/:device_id", delete(unregister_device))
        .route("/devices/:device_id/status", get(get_device_status))
        .route("/fleet/status", get(get_fleet_status))
        .route("/devices/:device_id/power-target", post(set_power_target))
        .route("/devices/:device_id/cooling-mode", post(set_cooling_mode))
        .route("/devices/:device_id/reboot", post(reboot_device))
        .route("/jobs/batch", post(create_batch_job))
        .route("/jobs/power-sweep", post(create_power_sweep_job))
        .route("/jobs/:job_id", get(get_job))
}
