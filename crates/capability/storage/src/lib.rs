//! # Fleet Storage 模块
//!
//! 提供存储抽象层，支持内存与 Redis 两种后端。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：`KvStore`（带 TTL 的键值存储）与 `DeviceStore`（设备注册表）
//! 2. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 3. **验证辅助层** (`validation.rs`)：设备注册信息校验
//! 4. **实现层**：
//!    - `in_memory/`：内存实现（测试、演示、未配置 Redis 时的默认后端）
//!    - `redis_kv.rs`：Redis 实现（任务记录与状态快照跨进程重启保留）
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use fleet_storage::{InMemoryKvStore, KvStore};
//! use std::time::Duration;
//!
//! let kv = InMemoryKvStore::new();
//! kv.put("job:1", "{}".to_string(), Some(Duration::from_secs(60))).await?;
//! let value = kv.get("job:1").await?;
//! ```
//!
//! ## 设计约束
//!
//! - 内存实现与 Redis 实现的读写语义一致（过期即不可见），仅缺少持久化
//! - 记录以 JSON 字符串存放，序列化由上层负责
//! - 不提供跨键事务；上层按键（job_id / device_id）自行串行化写入

pub mod error;
pub mod in_memory;
pub mod redis_kv;
pub mod traits;
pub mod validation;

pub use error::*;
pub use in_memory::{InMemoryDeviceStore, InMemoryKvStore};
pub use redis_kv::RedisKvStore;
pub use traits::*;
pub use validation::*;
