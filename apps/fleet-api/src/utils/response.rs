//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：bad_request_error, device_error, job_error, control_error
//! - DTO 转换：device_to_dto, status_to_dto, summary_to_dto, job_to_dto
//!
//! 所有错误返回统一的 ApiResponse 格式，HTTP 状态码与错误码对应。

use api_contract::{
    ApiResponse, DeviceDto, DeviceStatusDto, FleetDeviceDto, FleetSummaryDto, JobDto,
    JobErrorDto, JobProgressDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::{DeviceError, DeviceRegistration, DeviceStatus, JobRecord, StatusSnapshot};
use fleet_control::ControlError;
use fleet_jobs::JobError;
use fleet_status::FleetSummary;

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error("INVALID.REQUEST", message.into())),
    )
        .into_response()
}

/// 设备错误对应的 HTTP 状态码
pub fn device_status_code(err: &DeviceError) -> StatusCode {
    match err {
        DeviceError::Validation(_) => StatusCode::BAD_REQUEST,
        DeviceError::NotFound(_) => StatusCode::NOT_FOUND,
        DeviceError::Busy { .. } => StatusCode::CONFLICT,
        DeviceError::Offline { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DeviceError::Authentication { .. } | DeviceError::Connection { .. } => {
            StatusCode::BAD_GATEWAY
        }
        DeviceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DeviceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 设备错误响应（附带处置建议）
pub fn device_error(err: DeviceError) -> Response {
    (
        device_status_code(&err),
        Json(ApiResponse::<()>::error_with_suggestion(
            err.code(),
            err.to_string(),
            err.suggestion(),
        )),
    )
        .into_response()
}

/// 任务错误响应
pub fn job_error(err: JobError) -> Response {
    let status = match &err {
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::Terminal { .. } => StatusCode::CONFLICT,
        JobError::Validation(_) => StatusCode::BAD_REQUEST,
        JobError::Storage(_) | JobError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiResponse::<()>::error(err.code(), err.to_string())),
    )
        .into_response()
}

pub fn control_error(err: ControlError) -> Response {
    match err {
        ControlError::Device(err) => device_error(err),
        ControlError::Job(err) => job_error(err),
    }
}

/// DeviceRegistration 转 DeviceDto（不含凭据）
pub fn device_to_dto(record: DeviceRegistration, connected: bool) -> DeviceDto {
    DeviceDto {
        device_id: record.device_id,
        host: record.host,
        port: record.port,
        tags: record.tags,
        connected,
    }
}

fn device_status_to_dto(
    device_id: String,
    status: DeviceStatus,
    fetched_at_ms: i64,
    age_ms: i64,
) -> DeviceStatusDto {
    let efficiency_th_per_kw = status.efficiency_th_per_kw();
    DeviceStatusDto {
        device_id,
        hashrate_ths: status.hashrate_ths,
        temperature_c: status.temperature_c,
        power_w: status.power_w,
        power_target_w: status.power_target_w,
        cooling_mode: status.cooling_mode,
        uptime_s: status.uptime_s,
        efficiency_th_per_kw,
        fetched_at_ms,
        age_ms,
    }
}

/// StatusSnapshot 转 DeviceStatusDto
pub fn status_to_dto(snapshot: StatusSnapshot, now_ms: i64) -> DeviceStatusDto {
    let age_ms = snapshot.age_ms(now_ms);
    device_status_to_dto(
        snapshot.device_id,
        snapshot.status,
        snapshot.fetched_at_ms,
        age_ms,
    )
}

/// FleetSummary 转 FleetSummaryDto
pub fn summary_to_dto(summary: FleetSummary, now_ms: i64) -> FleetSummaryDto {
    let devices = summary
        .devices
        .into_iter()
        .map(|entry| {
            let status = match (entry.status, entry.fetched_at_ms) {
                (Some(status), Some(fetched_at_ms)) => Some(device_status_to_dto(
                    entry.device_id.clone(),
                    status,
                    fetched_at_ms,
                    (now_ms - fetched_at_ms).max(0),
                )),
                _ => None,
            };
            FleetDeviceDto {
                device_id: entry.device_id,
                reachable: entry.reachable,
                status,
                error: entry.error,
                error_code: entry.error_code,
            }
        })
        .collect();
    FleetSummaryDto {
        total_devices: summary.total_devices,
        reachable: summary.reachable,
        unreachable: summary.unreachable,
        total_hashrate_ths: summary.total_hashrate_ths,
        avg_temperature_c: summary.avg_temperature_c,
        avg_power_w: summary.avg_power_w,
        generated_at_ms: summary.generated_at_ms,
        devices,
    }
}

/// JobRecord 转 JobDto
pub fn job_to_dto(record: JobRecord) -> JobDto {
    let (error, suggestion) = match record.failure {
        Some(failure) => (Some(failure.message), failure.suggestion),
        None => (None, None),
    };
    JobDto {
        job_id: record.job_id,
        job_type: record.job_type,
        status: record.status.as_str().to_string(),
        progress: JobProgressDto {
            total: record.progress.total,
            completed: record.progress.completed,
            failed: record.progress.failed,
            percentage: record.progress.percentage,
        },
        started_at_ms: record.started_at_ms,
        completed_at_ms: record.completed_at_ms,
        errors: record
            .errors
            .into_iter()
            .map(|entry| JobErrorDto {
                error: entry.error,
                suggestion: entry.suggestion,
                unit: entry.unit,
                timestamp_ms: entry.timestamp_ms,
            })
            .collect(),
        metadata: record.metadata,
        results: record.results,
        error,
        suggestion,
    }
}
