//! 稳定的 DTO 与 API 响应契约。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub code: String,
    pub message: String,
    /// 处置建议（设备类错误携带）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
                suggestion: None,
            }),
        }
    }

    pub fn error_with_suggestion(
        code: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
                suggestion: Some(suggestion.into()),
            }),
        }
    }
}

/// 设备注册请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    #[serde(alias = "device_id")]
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 设备返回结构（不含凭据）。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDto {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub connected: bool,
}

/// 设备列表查询参数，`tags` 为逗号分隔。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListQuery {
    pub tags: Option<String>,
}

/// 单设备状态查询参数。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(default, alias = "force_refresh")]
    pub force_refresh: bool,
}

/// 集群状态查询参数，`tags` 与 `deviceIds` 为逗号分隔。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatusQuery {
    pub tags: Option<String>,
    #[serde(alias = "device_ids")]
    pub device_ids: Option<String>,
    #[serde(default, alias = "force_refresh")]
    pub force_refresh: bool,
}

/// 设备状态返回结构。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusDto {
    pub device_id: String,
    pub hashrate_ths: f64,
    pub temperature_c: Option<f64>,
    pub power_w: Option<f64>,
    pub power_target_w: Option<u32>,
    pub cooling_mode: Option<String>,
    pub uptime_s: Option<u64>,
    pub efficiency_th_per_kw: Option<f64>,
    pub fetched_at_ms: i64,
    pub age_ms: i64,
}

/// 集群汇总中的单台设备。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetDeviceDto {
    pub device_id: String,
    pub reachable: bool,
    pub status: Option<DeviceStatusDto>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

/// 集群汇总返回结构。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSummaryDto {
    pub total_devices: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub total_hashrate_ths: f64,
    pub avg_temperature_c: Option<f64>,
    pub avg_power_w: Option<f64>,
    pub generated_at_ms: i64,
    pub devices: Vec<FleetDeviceDto>,
}

/// 设置功率目标请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerTargetRequest {
    pub watts: u32,
}

/// 设置散热模式请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoolingModeRequest {
    pub mode: String,
}

/// 单设备控制结果。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResultDto {
    pub device_id: String,
    pub operation: String,
    pub result: serde_json::Value,
}

/// 批量任务请求体。`operation` 取 `set_power_target | set_cooling_mode | reboot`。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJobRequest {
    #[serde(alias = "device_ids")]
    pub device_ids: Vec<String>,
    pub operation: String,
    pub watts: Option<u32>,
    pub mode: Option<String>,
}

/// 功率扫描任务请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerSweepJobRequest {
    #[serde(alias = "device_id")]
    pub device_id: String,
    #[serde(alias = "targets_w")]
    pub targets_w: Vec<u32>,
    #[serde(default, alias = "settle_seconds")]
    pub settle_seconds: Option<u64>,
    #[serde(default, alias = "restore_original")]
    pub restore_original: Option<bool>,
}

/// 任务进度。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressDto {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub percentage: u8,
}

/// 任务中单个单元的失败。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorDto {
    pub error: String,
    pub suggestion: Option<String>,
    pub unit: Option<String>,
    pub timestamp_ms: i64,
}

/// 任务返回结构。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    pub progress: JobProgressDto,
    pub started_at_ms: i64,
    pub completed_at_ms: Option<i64>,
    pub errors: Vec<JobErrorDto>,
    pub metadata: serde_json::Value,
    pub results: Option<serde_json::Value>,
    pub error: Option<String>,
    pub suggestion: Option<String>,
}

/// 指标快照返回结构。
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub remote_calls: u64,
    pub remote_call_failures: u64,
    pub remote_retries: u64,
    pub remote_latency_ms_total: u64,
    pub remote_latency_ms_count: u64,
    pub logins: u64,
    pub login_failures: u64,
    pub connections_opened: u64,
    pub status_cache_hits: u64,
    pub status_cache_misses: u64,
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}
