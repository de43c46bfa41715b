//! 存储接口 Trait 定义
//!
//! - KvStore：带可选 TTL 的键值存储（任务记录、状态快照）
//! - DeviceStore：设备注册表
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发
//! - 内存实现与外部实现读写语义一致，仅缺少持久化

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{DeviceFilter, DeviceRegistration};
use std::time::Duration;

/// 键值存储接口
#[async_trait]
pub trait KvStore: Send + Sync {
    /// 读取键值；不存在或已过期时返回 None
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// 写入键值；`ttl` 为 None 表示不过期
    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError>;

    /// 删除键；返回是否确实删除了一条记录
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
}

/// 设备注册表接口
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// 注册设备（device_id 已存在时报错）
    async fn register_device(
        &self,
        record: DeviceRegistration,
    ) -> Result<DeviceRegistration, StorageError>;

    /// 注销设备，返回被移除的记录
    async fn unregister_device(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceRegistration>, StorageError>;

    /// 查找指定设备
    async fn find_device(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceRegistration>, StorageError>;

    /// 按过滤条件列出设备（按 device_id 排序）
    async fn list_devices(
        &self,
        filter: &DeviceFilter,
    ) -> Result<Vec<DeviceRegistration>, StorageError>;
}
