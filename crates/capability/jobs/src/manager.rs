//! 任务状态与进度管理。
//!
//! 同一任务的写入按 job_id 串行化（读取-修改-写回在同一把锁内完成），不同任务互不阻塞。

use crate::error::JobError;
use crate::store::JobStore;
use domain::{JobErrorEntry, JobFailure, JobProgress, JobRecord, JobStatus, now_epoch_ms};
use fleet_telemetry::{record_job_completed, record_job_created, record_job_failed};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub struct JobManager {
    store: JobStore,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl JobManager {
    pub fn new(store: JobStore) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 创建任务（`pending`，进度全零）。
    pub async fn create_job(
        &self,
        job_type: &str,
        total_units: u64,
        metadata: serde_json::Value,
    ) -> Result<JobRecord, JobError> {
        if job_type.trim().is_empty() {
            return Err(JobError::Validation("job type required".to_string()));
        }
        let record = JobRecord {
            job_id: uuid::Uuid::new_v4().to_string(),
            job_type: job_type.to_string(),
            status: JobStatus::Pending,
            progress: JobProgress::new(total_units),
            started_at_ms: now_epoch_ms(),
            completed_at_ms: None,
            errors: Vec::new(),
            metadata,
            results: None,
            failure: None,
        };
        self.store.save(&record).await?;
        record_job_created();
        info!(
            target: "fleet.jobs",
            job_id = %record.job_id,
            job_type = %record.job_type,
            total_units,
            "job_created"
        );
        Ok(record)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.store
            .load(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// 覆盖完成/失败计数并重算百分比；`pending` 任务转为 `running`。
    pub async fn update_progress(
        &self,
        job_id: &str,
        completed: u64,
        failed: u64,
    ) -> Result<JobRecord, JobError> {
        self.mutate(job_id, |record| {
            let total = record.progress.total;
            record.progress = JobProgress::with_counts(total, completed, failed).ok_or_else(|| {
                JobError::Validation(format!(
                    "completed ({completed}) + failed ({failed}) exceeds total ({total})"
                ))
            })?;
            if record.status == JobStatus::Pending {
                record.status = JobStatus::Running;
            }
            Ok(())
        })
        .await
    }

    /// 追加一条单元级错误，状态不变。
    pub async fn add_error(&self, job_id: &str, entry: JobErrorEntry) -> Result<JobRecord, JobError> {
        self.mutate(job_id, |record| {
            record.errors.push(entry);
            Ok(())
        })
        .await
    }

    pub async fn set_results(
        &self,
        job_id: &str,
        results: serde_json::Value,
    ) -> Result<JobRecord, JobError> {
        self.mutate(job_id, |record| {
            record.results = Some(results);
            Ok(())
        })
        .await
    }

    /// `pending → running`；已在运行时仅重写记录。
    pub async fn start_job(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.mutate(job_id, |record| {
            if record.status == JobStatus::Pending {
                record.status = JobStatus::Running;
            }
            Ok(())
        })
        .await
    }

    /// 落定为 `completed`；尚未开始的任务先进入 `running`。
    pub async fn complete_job(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.start_job(job_id).await?;
        let record = self
            .mutate(job_id, |record| {
                record.status = JobStatus::Completed;
                record.completed_at_ms = Some(now_epoch_ms());
                Ok(())
            })
            .await?;
        record_job_completed();
        self.forget_lock(job_id);
        info!(
            target: "fleet.jobs",
            job_id = %record.job_id,
            job_type = %record.job_type,
            completed = record.progress.completed,
            failed = record.progress.failed,
            total = record.progress.total,
            "job_completed"
        );
        Ok(record)
    }

    pub async fn fail_job(&self, job_id: &str, failure: JobFailure) -> Result<JobRecord, JobError> {
        self.start_job(job_id).await?;
        let record = self
            .mutate(job_id, |record| {
                record.status = JobStatus::Failed;
                record.completed_at_ms = Some(now_epoch_ms());
                record.failure = Some(failure);
                Ok(())
            })
            .await?;
        record_job_failed();
        self.forget_lock(job_id);
        warn!(
            target: "fleet.jobs",
            job_id = %record.job_id,
            job_type = %record.job_type,
            reason = record.failure.as_ref().map(|f| f.message.as_str()).unwrap_or_default(),
            "job_failed"
        );
        Ok(record)
    }

    async fn mutate<F>(&self, job_id: &str, apply: F) -> Result<JobRecord, JobError>
    where
        F: FnOnce(&mut JobRecord) -> Result<(), JobError>,
    {
        let lock = self.lock_for(job_id)?;
        let _guard = lock.lock().await;

        let mut record = self.get_job(job_id).await?;
        if record.status.is_terminal() {
            return Err(JobError::Terminal {
                job_id: job_id.to_string(),
                status: record.status,
            });
        }
        let previous = record.status;
        apply(&mut record)?;
        if !previous.can_transition_to(record.status) {
            return Err(JobError::Validation(format!(
                "illegal transition {previous} -> {}",
                record.status
            )));
        }
        self.store.save(&record).await?;
        Ok(record)
    }

    fn lock_for(&self, job_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, JobError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| JobError::Storage("lock failed".to_string()))?;
        Ok(locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    /// 终态任务不再写入，释放其锁。
    fn forget_lock(&self, job_id: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(job_id);
        }
    }
}
