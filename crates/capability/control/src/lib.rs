//! # 设备控制能力
//!
//! - `service`: 单设备同步控制（功率目标、冷却模式、重启），先校验输入再远程调用
//! - `registry`: 设备注册与注销（注销时关闭连接、丢弃会话与状态缓存）
//! - `batch`: 批量任务，对多台设备依次执行同一操作并逐台记录结果
//! - `sweep`: 功率扫描任务，逐档设置功率目标并记录算力、温度、功耗与能效
//!
//! 批量与扫描任务通过 `fleet-jobs` 在后台运行，创建后立即返回 `pending` 任务记录。

pub mod batch;
pub mod error;
pub mod registry;
pub mod service;
pub mod sweep;

pub use batch::{BatchItem, BatchReport, start_batch};
pub use error::ControlError;
pub use registry::DeviceRegistry;
pub use service::{ControlConfig, DeviceControlService};
pub use sweep::{PowerSweepPhase, PowerSweepReport, PowerSweepRequest, start_power_sweep};
