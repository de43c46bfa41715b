//! 内存存储实现模块
//!
//! 用于本地演示和测试，也是未配置 Redis 时的默认后端。
//!
//! 包含以下实现：
//! - KvStore: InMemoryKvStore
//! - DeviceStore: InMemoryDeviceStore

pub mod device;
pub mod kv;

pub use device::*;
pub use kv::*;
