//! 设备注册表 handlers
//!
//! - GET /devices?tags=a,b - 列出设备（标签需全部命中）
//! - POST /devices - 注册设备（device_id 已存在时返回 400）
//! - DELETE /devices/:device_id - 注销设备，同时关闭连接、丢弃会话与状态缓存

use crate::AppState;
use crate::utils::response::{device_error, device_to_dto};
use crate::utils::{normalize_required, split_csv};
use api_contract::{ApiResponse, DeviceDto, DeviceListQuery, RegisterDeviceRequest};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{DeviceCredentials, DeviceFilter, DeviceRegistration};

#[derive(serde::Deserialize)]
pub struct DevicePath {
    pub device_id: String,
}

pub async fn list_devices(
    State(state): State<AppState>,
    Query(query): Query<DeviceListQuery>,
) -> Response {
    let filter = DeviceFilter::with_tags(split_csv(query.tags.as_deref()));
    match state.registry.list_devices(&filter).await {
        Ok(items) => {
            let data: Vec<DeviceDto> = items
                .into_iter()
                .map(|record| {
                    let connected = state.gateway.is_connected(&record.device_key());
                    device_to_dto(record, connected)
                })
                .collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => device_error(err),
    }
}

/// 注册设备
///
/// 校验 deviceId、host、username 非空后写入注册表。连接与登录延迟到首次调用时建立。
pub async fn register_device(
    State(state): State<AppState>,
    Json(req): Json<RegisterDeviceRequest>,
) -> Response {
    let device_id = match normalize_required(req.device_id, "deviceId") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let host = match normalize_required(req.host, "host") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let username = match normalize_required(req.username, "username") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let registration = DeviceRegistration {
        device_id,
        host,
        port: req.port,
        credentials: DeviceCredentials::new(username, req.password),
        tags: req
            .tags
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect(),
    };
    match state.registry.register_device(registration).await {
        Ok(record) => (
            StatusCode::CREATED,
            Json(ApiResponse::success(device_to_dto(record, false))),
        )
            .into_response(),
        Err(err) => device_error(err),
    }
}

pub async fn unregister_device(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
) -> Response {
    match state.registry.unregister_device(&path.device_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(ApiResponse::success(device_to_dto(record, false))),
        )
            .into_response(),
        Err(err) => device_error(err),
    }
}
