pub mod device;
pub mod error;
pub mod job;
pub mod operation;
pub mod status;

pub use device::{DeviceCredentials, DeviceFilter, DeviceRegistration};
pub use error::DeviceError;
pub use job::{
    JobErrorEntry, JobFailure, JobProgress, JobRecord, JobStatus, percentage_of,
};
pub use operation::{CoolingMode, DeviceOperation};
pub use status::{DeviceStatus, StatusSnapshot};

/// 当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
