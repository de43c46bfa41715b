//! 状态查询 handlers
//!
//! - GET /devices/:device_id/status?forceRefresh=true - 单设备状态（TTL 内读缓存）
//! - GET /fleet/status?tags=&deviceIds=&forceRefresh= - 集群汇总，单台失败不影响整体

use crate::AppState;
use crate::handlers::devices::DevicePath;
use crate::utils::response::{device_error, status_to_dto, summary_to_dto};
use crate::utils::split_csv;
use api_contract::{ApiResponse, FleetStatusQuery, StatusQuery};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{DeviceFilter, now_epoch_ms};

pub async fn get_device_status(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    Query(query): Query<StatusQuery>,
) -> Response {
    match state
        .cache
        .get_status(&path.device_id, query.force_refresh)
        .await
    {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ApiResponse::success(status_to_dto(snapshot, now_epoch_ms()))),
        )
            .into_response(),
        Err(err) => device_error(err),
    }
}

pub async fn get_fleet_status(
    State(state): State<AppState>,
    Query(query): Query<FleetStatusQuery>,
) -> Response {
    let device_ids = split_csv(query.device_ids.as_deref());
    let filter = DeviceFilter {
        tags: split_csv(query.tags.as_deref()),
        device_ids: (!device_ids.is_empty()).then_some(device_ids),
    };
    match state
        .fleet
        .get_fleet_status(&filter, query.force_refresh)
        .await
    {
        Ok(summary) => (
            StatusCode::OK,
            Json(ApiResponse::success(summary_to_dto(summary, now_epoch_ms()))),
        )
            .into_response(),
        Err(err) => device_error(err),
    }
}
