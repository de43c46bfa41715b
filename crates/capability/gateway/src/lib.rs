//! # 远程调用能力
//!
//! 统一的设备远程调用入口：连接复用、会话 token、单次调用超时与重试退避。
//!
//! ## 模块
//!
//! - `transport`: 设备传输抽象（`DeviceConnector` / `DeviceChannel`）
//! - `retry`: 重试退避策略
//! - `gateway`: `RemoteGateway`，组合连接池、会话管理与重试
//! - `tcp_json`: 行分隔 JSON RPC 的 TCP 传输
//! - `simulator`: 模拟设备（演示模式与测试）
//!
//! ## 错误分类
//!
//! - 连接失败、超时：在退避循环内重试，耗尽后返回 `DeviceError::Connection`
//! - 认证失败：使会话失效后立即返回
//! - 参数校验、设备离线/忙：立即返回

pub mod gateway;
pub mod retry;
pub mod simulator;
pub mod tcp_json;
pub mod transport;

pub use gateway::RemoteGateway;
pub use retry::RetryPolicy;
pub use simulator::{SimulatedBehavior, SimulatedConnector};
pub use tcp_json::{TcpJsonConfig, TcpJsonConnector};
pub use transport::{DeviceChannel, DeviceConnector};
