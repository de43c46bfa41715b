use domain::JobStatus;

/// 任务编排错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("job {job_id} is already {status}")]
    Terminal { job_id: String, status: JobStatus },
    #[error("invalid job update: {0}")]
    Validation(String),
    #[error("job storage error: {0}")]
    Storage(String),
    #[error("job record encoding error: {0}")]
    Encoding(String),
}

impl JobError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "JOB.NOT_FOUND",
            Self::Terminal { .. } => "JOB.TERMINAL",
            Self::Validation(_) => "INVALID.REQUEST",
            Self::Storage(_) | Self::Encoding(_) => "INTERNAL.ERROR",
        }
    }
}

impl From<fleet_storage::StorageError> for JobError {
    fn from(err: fleet_storage::StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
