//! 设备操作错误分类。
//!
//! - 可在单次调用内重试：`Connection`、`Timeout`
//! - 不可重试：`Validation`、`Authentication`（同时使会话失效）、`NotFound`、`Busy`、`Offline`、`Internal`
//!
//! `Offline` / `Busy` 可在任务或批量层面稍后重试，但不在网关的退避循环内重试。

/// 设备操作错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("device {device} is offline: {reason}")]
    Offline { device: String, reason: String },
    #[error("device {device} is busy: {reason}")]
    Busy { device: String, reason: String },
    #[error("authentication failed for {device}: {reason}")]
    Authentication { device: String, reason: String },
    #[error("connection to {device} failed after {attempts} attempt(s): {last_error}")]
    Connection {
        device: String,
        attempts: u32,
        last_error: String,
    },
    #[error("call to {device} timed out after {timeout_ms}ms")]
    Timeout { device: String, timeout_ms: u64 },
    #[error("internal error: {0}")]
    Internal(String),
}

impl DeviceError {
    /// 单次连接层失败（尚未计入重试次数）。
    pub fn connection(device: impl Into<String>, last_error: impl Into<String>) -> Self {
        Self::Connection {
            device: device.into(),
            attempts: 1,
            last_error: last_error.into(),
        }
    }

    /// 网关退避循环内可重试。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// 稳定错误码（对外响应使用）。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "INVALID.REQUEST",
            Self::NotFound(_) => "DEVICE.NOT_FOUND",
            Self::Offline { .. } => "DEVICE.OFFLINE",
            Self::Busy { .. } => "DEVICE.BUSY",
            Self::Authentication { .. } => "DEVICE.AUTHENTICATION",
            Self::Connection { .. } => "DEVICE.CONNECTION",
            Self::Timeout { .. } => "DEVICE.TIMEOUT",
            Self::Internal(_) => "INTERNAL.ERROR",
        }
    }

    /// 面向操作人员的处置建议。
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Validation(_) => "check the request parameters against the device limits",
            Self::NotFound(_) => "register the device before operating on it",
            Self::Offline { .. } => "device reports it is unavailable; retry after it comes back online",
            Self::Busy { .. } => "another operation is in progress on the device; retry later",
            Self::Authentication { .. } => "verify the device credentials",
            Self::Connection { .. } => "verify device is online and reachable",
            Self::Timeout { .. } => "verify device is online and reachable; consider a longer call timeout",
            Self::Internal(_) => "check service logs for details",
        }
    }
}

impl From<DeviceError> for crate::job::JobFailure {
    fn from(err: DeviceError) -> Self {
        Self {
            suggestion: Some(err.suggestion().to_string()),
            message: err.to_string(),
        }
    }
}
