use domain::DeviceError;
use fleet_jobs::JobError;

/// 控制链路错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Job(#[from] JobError),
}

impl ControlError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Device(err) => err.code(),
            Self::Job(err) => err.code(),
        }
    }
}
