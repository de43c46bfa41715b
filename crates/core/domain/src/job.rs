//! 异步任务记录与状态机。

use serde::{Deserialize, Serialize};

/// 任务状态。
///
/// 仅允许 `pending → running → {completed | failed}`，终态不可再变更。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// 状态迁移是否合法（同态迁移视为合法的幂等写入）。
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Pending | Self::Running) => true,
            (Self::Pending, _) => false,
            (Self::Running, Self::Pending) => false,
            (Self::Running, _) => true,
            (Self::Completed, _) | (Self::Failed, _) => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务进度。不变量：`completed + failed <= total`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
    pub percentage: u8,
}

impl JobProgress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            percentage: 0,
        }
    }

    /// 以新的计数构造进度；计数越界时返回 None。
    pub fn with_counts(total: u64, completed: u64, failed: u64) -> Option<Self> {
        if completed.checked_add(failed)? > total {
            return None;
        }
        Some(Self {
            total,
            completed,
            failed,
            percentage: percentage_of(completed, total),
        })
    }

    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }
}

/// `round(completed / total * 100)`，total 为 0 时为 0。
pub fn percentage_of(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let value = (completed as f64 / total as f64 * 100.0).round();
    value.clamp(0.0, 100.0) as u8
}

/// 批量任务中单个单元的失败记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobErrorEntry {
    pub error: String,
    #[serde(default)]
    pub suggestion: Option<String>,
    /// 失败单元（设备 ID 或阶段名）
    #[serde(default)]
    pub unit: Option<String>,
    pub timestamp_ms: i64,
}

/// 任务整体失败原因。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub message: String,
    #[serde(default)]
    pub suggestion: Option<String>,
}

impl JobFailure {
    pub fn new(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

/// 任务记录（存放于任务存储中，按 job_id 读写）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub started_at_ms: i64,
    #[serde(default)]
    pub completed_at_ms: Option<i64>,
    #[serde(default)]
    pub errors: Vec<JobErrorEntry>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub results: Option<serde_json::Value>,
    #[serde(default)]
    pub failure: Option<JobFailure>,
}
