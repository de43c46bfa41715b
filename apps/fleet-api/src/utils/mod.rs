//! HTTP 辅助模块：统一响应与输入校验。

pub mod response;
pub mod validation;

pub use validation::*;
