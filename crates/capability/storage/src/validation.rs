//! 验证辅助函数
//!
//! 设备注册前的基础校验：
//! - device_id 非空且不含 `:`（`:` 用作 KV 键分隔符）
//! - host 非空，port 非 0
//! - 凭据用户名非空

use crate::error::StorageError;
use domain::DeviceRegistration;

/// 验证设备注册信息
pub fn ensure_valid_registration(record: &DeviceRegistration) -> Result<(), StorageError> {
    if record.device_id.trim().is_empty() {
        return Err(StorageError::new("device_id required"));
    }
    if record.device_id.contains(':') {
        return Err(StorageError::new("device_id must not contain ':'"));
    }
    if record.host.trim().is_empty() {
        return Err(StorageError::new("host required"));
    }
    if record.port == 0 {
        return Err(StorageError::new("port required"));
    }
    if record.credentials.username.trim().is_empty() {
        return Err(StorageError::new("username required"));
    }
    Ok(())
}
