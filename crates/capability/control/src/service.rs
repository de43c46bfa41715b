//! 单设备同步控制。

use domain::{CoolingMode, DeviceError, DeviceOperation, DeviceRegistration};
use fleet_gateway::RemoteGateway;
use fleet_status::StatusCache;
use fleet_storage::DeviceStore;
use std::sync::Arc;
use tracing::{info, warn};

/// 控制输入的服务端校验范围。设备可能有更严格的限制，由设备自行拒绝。
#[derive(Debug, Clone)]
pub struct ControlConfig {
    pub min_power_w: u32,
    pub max_power_w: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            min_power_w: 100,
            max_power_w: 20_000,
        }
    }
}

/// 设备控制服务。
#[derive(Clone)]
pub struct DeviceControlService {
    devices: Arc<dyn DeviceStore>,
    gateway: Arc<RemoteGateway>,
    cache: Arc<StatusCache>,
    config: ControlConfig,
}

impl DeviceControlService {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        gateway: Arc<RemoteGateway>,
        cache: Arc<StatusCache>,
    ) -> Self {
        Self::new_with_config(devices, gateway, cache, ControlConfig::default())
    }

    pub fn new_with_config(
        devices: Arc<dyn DeviceStore>,
        gateway: Arc<RemoteGateway>,
        cache: Arc<StatusCache>,
        config: ControlConfig,
    ) -> Self {
        Self {
            devices,
            gateway,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<StatusCache> {
        &self.cache
    }

    pub async fn set_power_target(
        &self,
        device_id: &str,
        watts: u32,
    ) -> Result<serde_json::Value, DeviceError> {
        self.execute(device_id, &DeviceOperation::SetPowerTarget { watts })
            .await
    }

    pub async fn set_cooling_mode(
        &self,
        device_id: &str,
        mode: CoolingMode,
    ) -> Result<serde_json::Value, DeviceError> {
        self.execute(device_id, &DeviceOperation::SetCoolingMode { mode })
            .await
    }

    pub async fn reboot(&self, device_id: &str) -> Result<serde_json::Value, DeviceError> {
        self.execute(device_id, &DeviceOperation::Reboot).await
    }

    /// 校验并执行操作；变更类操作之后使该设备的状态缓存失效。
    pub async fn execute(
        &self,
        device_id: &str,
        operation: &DeviceOperation,
    ) -> Result<serde_json::Value, DeviceError> {
        self.validate(operation)?;
        let device = self.find_device(device_id).await?;
        info!(
            target: "fleet.control",
            device_id = %device_id,
            operation = operation.method(),
            params = %operation.params(),
            "control_operation_requested"
        );

        let result = self.gateway.execute(&device, operation).await;
        if operation.is_mutating() {
            // 失败（尤其是超时）也可能已在设备侧生效。
            if let Err(err) = self.cache.invalidate(device_id).await {
                warn!(target: "fleet.control", device_id = %device_id, error = %err, "status_invalidate_failed");
            }
        }
        match &result {
            Ok(_) => info!(
                target: "fleet.control",
                device_id = %device_id,
                operation = operation.method(),
                "control_operation_succeeded"
            ),
            Err(err) => warn!(
                target: "fleet.control",
                device_id = %device_id,
                operation = operation.method(),
                code = err.code(),
                error = %err,
                "control_operation_failed"
            ),
        }
        result
    }

    /// 远程调用前的输入校验。
    pub fn validate(&self, operation: &DeviceOperation) -> Result<(), DeviceError> {
        if let DeviceOperation::SetPowerTarget { watts } = operation {
            if *watts < self.config.min_power_w || *watts > self.config.max_power_w {
                return Err(DeviceError::Validation(format!(
                    "power target {}W outside allowed range {}W..={}W",
                    watts, self.config.min_power_w, self.config.max_power_w
                )));
            }
        }
        Ok(())
    }

    pub async fn find_device(&self, device_id: &str) -> Result<DeviceRegistration, DeviceError> {
        self.devices
            .find_device(device_id)
            .await
            .map_err(|err| DeviceError::Internal(err.to_string()))?
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))
    }
}
