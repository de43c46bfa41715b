//! 异步任务 handlers
//!
//! - POST /jobs/batch - 创建批量任务，立即返回 202 与 pending 任务
//! - POST /jobs/power-sweep - 创建功率扫描任务
//! - GET /jobs/:job_id - 查询任务进度与结果

use crate::utils::response::{bad_request_error, control_error, device_error, job_error, job_to_dto};
use crate::{AppState, DEFAULT_SWEEP_SETTLE};
use api_contract::{ApiResponse, BatchJobRequest, PowerSweepJobRequest};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{CoolingMode, DeviceOperation};
use fleet_control::{PowerSweepRequest, start_batch, start_power_sweep};
use std::time::Duration;

#[derive(serde::Deserialize)]
pub struct JobPath {
    pub job_id: String,
}

pub async fn create_batch_job(
    State(state): State<AppState>,
    Json(req): Json<BatchJobRequest>,
) -> Response {
    let operation = match batch_operation(&req) {
        Ok(operation) => operation,
        Err(response) => return response,
    };
    match start_batch(
        state.jobs.clone(),
        state.control.clone(),
        req.device_ids,
        operation,
    )
    .await
    {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(job_to_dto(job))),
        )
            .into_response(),
        Err(err) => control_error(err),
    }
}

pub async fn create_power_sweep_job(
    State(state): State<AppState>,
    Json(req): Json<PowerSweepJobRequest>,
) -> Response {
    let request = PowerSweepRequest {
        device_id: req.device_id.trim().to_string(),
        targets_w: req.targets_w,
        settle: req
            .settle_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SWEEP_SETTLE),
        restore_original: req.restore_original.unwrap_or(true),
    };
    match start_power_sweep(state.jobs.clone(), state.control.clone(), request).await {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(job_to_dto(job))),
        )
            .into_response(),
        Err(err) => control_error(err),
    }
}

pub async fn get_job(State(state): State<AppState>, Path(path): Path<JobPath>) -> Response {
    match state.jobs.get_job(&path.job_id).await {
        Ok(job) => (StatusCode::OK, Json(ApiResponse::success(job_to_dto(job)))).into_response(),
        Err(err) => job_error(err),
    }
}

/// 由请求体解析批量操作；读取状态不作为批量操作提供。
fn batch_operation(req: &BatchJobRequest) -> Result<DeviceOperation, Response> {
    match req.operation.trim() {
        "set_power_target" => match req.watts {
            Some(watts) => Ok(DeviceOperation::SetPowerTarget { watts }),
            None => Err(bad_request_error("watts required")),
        },
        "set_cooling_mode" => match req.mode.as_deref() {
            Some(mode) => mode
                .parse::<CoolingMode>()
                .map(|mode| DeviceOperation::SetCoolingMode { mode })
                .map_err(device_error),
            None => Err(bad_request_error("mode required")),
        },
        "reboot" => Ok(DeviceOperation::Reboot),
        other => Err(bad_request_error(format!("unsupported operation: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(operation: &str, watts: Option<u32>, mode: Option<&str>) -> BatchJobRequest {
        BatchJobRequest {
            device_ids: vec!["rig-1".to_string()],
            operation: operation.to_string(),
            watts,
            mode: mode.map(str::to_string),
        }
    }

    #[test]
    fn batch_operation_requires_parameters() {
        assert!(matches!(
            batch_operation(&request("set_power_target", Some(3000), None)),
            Ok(DeviceOperation::SetPowerTarget { watts: 3000 })
        ));
        assert!(batch_operation(&request("set_power_target", None, None)).is_err());
        assert!(matches!(
            batch_operation(&request("set_cooling_mode", None, Some("manual"))),
            Ok(DeviceOperation::SetCoolingMode {
                mode: CoolingMode::Manual
            })
        ));
        assert!(batch_operation(&request("get_status", None, None)).is_err());
    }
}
