//! 设备注册表内存实现
//!
//! 功能：
//! - 设备注册 / 注销
//! - 按标签与 ID 过滤
//! - 列表按 device_id 排序，保证聚合结果与注册顺序无关

use crate::error::StorageError;
use crate::traits::DeviceStore;
use crate::validation::ensure_valid_registration;
use domain::{DeviceFilter, DeviceRegistration};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// 设备内存存储
pub struct InMemoryDeviceStore {
    devices: RwLock<BTreeMap<String, DeviceRegistration>>,
}

impl InMemoryDeviceStore {
    /// 创建新的设备存储
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryDeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceStore for InMemoryDeviceStore {
    async fn register_device(
        &self,
        record: DeviceRegistration,
    ) -> Result<DeviceRegistration, StorageError> {
        ensure_valid_registration(&record)?;
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if map.contains_key(&record.device_id) {
            return Err(StorageError::new("device exists"));
        }
        map.insert(record.device_id.clone(), record.clone());
        Ok(record)
    }

    async fn unregister_device(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceRegistration>, StorageError> {
        let mut map = self
            .devices
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(device_id))
    }

    async fn find_device(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceRegistration>, StorageError> {
        let map = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(device_id).cloned())
    }

    async fn list_devices(
        &self,
        filter: &DeviceFilter,
    ) -> Result<Vec<DeviceRegistration>, StorageError> {
        let map = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map
            .values()
            .filter(|item| item.matches(filter))
            .cloned()
            .collect())
    }
}
