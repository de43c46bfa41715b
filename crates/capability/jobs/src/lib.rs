//! # 异步任务编排
//!
//! 长耗时操作以任务形式在后台执行，调用方立即拿到 `job_id` 并轮询进度。
//!
//! ## 状态机
//!
//! `pending → running → completed | failed`；终态之后的任何变更都会被拒绝。
//!
//! ## 模块
//!
//! - `store`: 任务记录的 KV 持久化（`job:{id}`，带保留 TTL）
//! - `manager`: `JobManager`，按任务串行化的状态与进度更新
//! - `runner`: 受监督的后台执行，错误返回或 panic 都会落为 `fail_job`

pub mod error;
pub mod manager;
pub mod runner;
pub mod store;

pub use error::JobError;
pub use manager::JobManager;
pub use runner::spawn_job;
pub use store::JobStore;
