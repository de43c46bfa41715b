//! # 状态缓存与集群聚合
//!
//! - `cache`: 单设备状态快照缓存（TTL、强制刷新、失效、并发未命中合并）
//! - `fleet`: 集群状态聚合（并行拉取、单设备故障隔离、汇总缓存）

pub mod cache;
pub mod fleet;

pub use cache::StatusCache;
pub use fleet::{FleetAggregator, FleetDeviceEntry, FleetSummary, summarize};
