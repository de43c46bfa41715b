//! 批量任务：对多台设备依次执行同一操作。
//!
//! 单台失败通过 `add_error` 记录（含处置建议），不会中断其余设备；
//! 任务以成功/失败计数混合完成，结果为 `BatchReport`。

use crate::error::ControlError;
use crate::service::DeviceControlService;
use domain::{DeviceError, DeviceOperation, JobErrorEntry, JobFailure, JobRecord, now_epoch_ms};
use fleet_jobs::{JobManager, spawn_job};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// 单台设备的执行结果。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub device_id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub operation: String,
    pub successful: u64,
    pub failed: u64,
    pub items: Vec<BatchItem>,
}

/// 创建批量任务并在后台执行，立即返回 `pending` 任务记录。
pub async fn start_batch(
    jobs: Arc<JobManager>,
    control: DeviceControlService,
    device_ids: Vec<String>,
    operation: DeviceOperation,
) -> Result<JobRecord, ControlError> {
    control.validate(&operation)?;
    let device_ids = dedup(device_ids);
    if device_ids.is_empty() {
        return Err(DeviceError::Validation("device_ids required".to_string()).into());
    }

    let job_type = format!("batch_{}", operation.method());
    let metadata = serde_json::json!({
        "operation": operation,
        "device_ids": device_ids,
    });
    let job = jobs
        .create_job(&job_type, device_ids.len() as u64, metadata)
        .await?;
    spawn_job(
        jobs.clone(),
        job.job_id.clone(),
        run_batch(jobs, control, job.job_id.clone(), device_ids, operation),
    );
    Ok(job)
}

async fn run_batch(
    jobs: Arc<JobManager>,
    control: DeviceControlService,
    job_id: String,
    device_ids: Vec<String>,
    operation: DeviceOperation,
) -> Result<(), JobFailure> {
    let mut report = BatchReport {
        operation: operation.method().to_string(),
        successful: 0,
        failed: 0,
        items: Vec::with_capacity(device_ids.len()),
    };

    for device_id in device_ids {
        match control.execute(&device_id, &operation).await {
            Ok(result) => {
                report.successful += 1;
                report.items.push(BatchItem {
                    device_id,
                    success: true,
                    result: Some(result),
                    error: None,
                    error_code: None,
                    suggestion: None,
                });
            }
            Err(err) => {
                report.failed += 1;
                jobs.add_error(
                    &job_id,
                    JobErrorEntry {
                        error: err.to_string(),
                        suggestion: Some(err.suggestion().to_string()),
                        unit: Some(device_id.clone()),
                        timestamp_ms: now_epoch_ms(),
                    },
                )
                .await?;
                report.items.push(BatchItem {
                    device_id,
                    success: false,
                    result: None,
                    error: Some(err.to_string()),
                    error_code: Some(err.code().to_string()),
                    suggestion: Some(err.suggestion().to_string()),
                });
            }
        }
        jobs.update_progress(&job_id, report.successful, report.failed)
            .await?;
    }

    let results = serde_json::to_value(&report).map_err(|err| {
        JobFailure::new(
            format!("batch report encoding failed: {err}"),
            "check service logs for details",
        )
    })?;
    jobs.set_results(&job_id, results).await?;
    info!(
        target: "fleet.control",
        job_id = %job_id,
        operation = %report.operation,
        successful = report.successful,
        failed = report.failed,
        "batch_finished"
    );
    Ok(())
}

/// 去重并保持原有顺序。
fn dedup(device_ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    device_ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}
