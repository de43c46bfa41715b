//! 设备传输抽象。

use async_trait::async_trait;
use domain::{DeviceCredentials, DeviceError, DeviceOperation, DeviceRegistration};
use fleet_session::LoginGrant;
use std::sync::Arc;

/// 建立到设备的通道。
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(
        &self,
        device: &DeviceRegistration,
    ) -> Result<Arc<dyn DeviceChannel>, DeviceError>;
}

/// 已建立的设备通道。
///
/// 连接类失败返回 `DeviceError::Connection`，设备拒绝返回对应的终态错误。
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    async fn login(&self, credentials: &DeviceCredentials) -> Result<LoginGrant, DeviceError>;

    async fn call(
        &self,
        token: &str,
        operation: &DeviceOperation,
    ) -> Result<serde_json::Value, DeviceError>;

    async fn close(&self);
}
