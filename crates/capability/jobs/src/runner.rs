//! 受监督的后台任务执行。
//!
//! 任务体在独立的 tokio 任务中运行，外层监督任务等待其结束并落定终态：
//!
//! - `Ok(())` → `complete_job`（任务体已自行落定终态时跳过）
//! - `Err(failure)` → `fail_job(failure)`
//! - panic → `fail_job`，附带 panic 信息与处置建议

use crate::error::JobError;
use crate::manager::JobManager;
use domain::JobFailure;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// 在后台执行任务体；返回监督任务的句柄（通常无需等待）。
pub fn spawn_job<F>(manager: Arc<JobManager>, job_id: String, work: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), JobFailure>> + Send + 'static,
{
    tokio::spawn(async move {
        let outcome = match tokio::spawn(work).await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                let detail = panic_message(join_err.into_panic());
                error!(target: "fleet.jobs", job_id = %job_id, panic = %detail, "job_panicked");
                Err(JobFailure::new(
                    format!("job aborted unexpectedly: {detail}"),
                    "check service logs and retry the job",
                ))
            }
            Err(join_err) => Err(JobFailure::new(
                format!("job task cancelled: {join_err}"),
                "retry the job",
            )),
        };

        let settled = match outcome {
            Ok(()) => manager.complete_job(&job_id).await,
            Err(failure) => manager.fail_job(&job_id, failure).await,
        };
        match settled {
            Ok(_) => {}
            Err(JobError::Terminal { status, .. }) => {
                debug!(target: "fleet.jobs", job_id = %job_id, status = %status, "job_already_settled");
            }
            Err(err) => {
                warn!(target: "fleet.jobs", job_id = %job_id, error = %err, "job_settle_failed");
            }
        }
    })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "unknown panic".to_string()
}

impl From<JobError> for JobFailure {
    fn from(err: JobError) -> Self {
        let suggestion = match &err {
            JobError::Storage(_) | JobError::Encoding(_) => "check job storage availability and retry",
            _ => "check service logs for details",
        };
        JobFailure::new(err.to_string(), suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(7u8)), "unknown panic");
    }
}
