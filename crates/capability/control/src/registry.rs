//! 设备注册表服务。

use domain::{DeviceError, DeviceFilter, DeviceRegistration};
use fleet_gateway::RemoteGateway;
use fleet_status::StatusCache;
use fleet_storage::{DeviceStore, ensure_valid_registration};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct DeviceRegistry {
    devices: Arc<dyn DeviceStore>,
    gateway: Arc<RemoteGateway>,
    cache: Arc<StatusCache>,
}

impl DeviceRegistry {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        gateway: Arc<RemoteGateway>,
        cache: Arc<StatusCache>,
    ) -> Self {
        Self {
            devices,
            gateway,
            cache,
        }
    }

    /// 注册设备；device_id 已存在时返回校验错误。
    ///
    /// 注册后已缓存的集群汇总不再命中。
    pub async fn register_device(
        &self,
        registration: DeviceRegistration,
    ) -> Result<DeviceRegistration, DeviceError> {
        ensure_valid_registration(&registration)
            .map_err(|err| DeviceError::Validation(err.to_string()))?;
        let existing = self
            .devices
            .find_device(&registration.device_id)
            .await
            .map_err(internal)?;
        if existing.is_some() {
            return Err(DeviceError::Validation(format!(
                "device {} already registered",
                registration.device_id
            )));
        }
        let record = self
            .devices
            .register_device(registration)
            .await
            .map_err(internal)?;
        if let Err(err) = self.cache.invalidate(&record.device_id).await {
            warn!(target: "fleet.control", device_id = %record.device_id, error = %err, "status_invalidate_failed");
        }
        info!(
            target: "fleet.control",
            device_id = %record.device_id,
            device = %record.device_key(),
            tags = ?record.tags,
            "device_registered"
        );
        Ok(record)
    }

    /// 注销设备，同时关闭连接，丢弃会话、按设备的锁与状态缓存。
    pub async fn unregister_device(&self, device_id: &str) -> Result<DeviceRegistration, DeviceError> {
        let record = self
            .devices
            .unregister_device(device_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))?;

        let key = record.device_key();
        self.gateway.forget(&key).await;
        if let Err(err) = self.cache.invalidate(device_id).await {
            warn!(target: "fleet.control", device_id = %device_id, error = %err, "status_invalidate_failed");
        }
        info!(
            target: "fleet.control",
            device_id = %device_id,
            device = %key,
            "device_unregistered"
        );
        Ok(record)
    }

    pub async fn find_device(&self, device_id: &str) -> Result<DeviceRegistration, DeviceError> {
        self.devices
            .find_device(device_id)
            .await
            .map_err(internal)?
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))
    }

    pub async fn list_devices(
        &self,
        filter: &DeviceFilter,
    ) -> Result<Vec<DeviceRegistration>, DeviceError> {
        self.devices.list_devices(filter).await.map_err(internal)
    }
}

fn internal(err: fleet_storage::StorageError) -> DeviceError {
    DeviceError::Internal(err.to_string())
}
