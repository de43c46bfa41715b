//! Handlers 模块

pub mod control;
pub mod devices;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod status;

pub use control::*;
pub use devices::*;
pub use health::*;
pub use jobs::*;
pub use metrics::*;
pub use status::*;
