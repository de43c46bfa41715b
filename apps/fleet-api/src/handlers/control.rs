//! 单设备控制 handlers
//!
//! - POST /devices/:device_id/power-target
//! - POST /devices/:device_id/cooling-mode
//! - POST /devices/:device_id/reboot
//!
//! 输入在远程调用前校验；成功后该设备的状态缓存失效。

use crate::AppState;
use crate::handlers::devices::DevicePath;
use crate::utils::response::device_error;
use api_contract::{ApiResponse, ControlResultDto, CoolingModeRequest, PowerTargetRequest};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{CoolingMode, DeviceOperation};

pub async fn set_power_target(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    Json(req): Json<PowerTargetRequest>,
) -> Response {
    run(
        &state,
        path.device_id,
        DeviceOperation::SetPowerTarget { watts: req.watts },
    )
    .await
}

pub async fn set_cooling_mode(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    Json(req): Json<CoolingModeRequest>,
) -> Response {
    let mode = match req.mode.parse::<CoolingMode>() {
        Ok(mode) => mode,
        Err(err) => return device_error(err),
    };
    run(&state, path.device_id, DeviceOperation::SetCoolingMode { mode }).await
}

pub async fn reboot_device(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
) -> Response {
    run(&state, path.device_id, DeviceOperation::Reboot).await
}

async fn run(state: &AppState, device_id: String, operation: DeviceOperation) -> Response {
    match state.control.execute(&device_id, &operation).await {
        Ok(result) => (
            StatusCode::OK,
            Json(ApiResponse::success(ControlResultDto {
                device_id,
                operation: operation.method().to_string(),
                result,
            })),
        )
            .into_response(),
        Err(err) => device_error(err),
    }
}
