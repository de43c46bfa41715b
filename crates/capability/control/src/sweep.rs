//! 功率扫描任务。
//!
//! 对单台设备逐档设置功率目标，等待稳定后强制刷新状态，记录算力、温度、功耗与能效（TH/kW），
//! 最终报告能效最高的一档。单档失败记为错误并继续下一档；结束后尽力恢复原功率目标。
//! 读取初始状态失败时整个任务失败。

use crate::error::ControlError;
use crate::service::DeviceControlService;
use domain::{DeviceError, DeviceOperation, JobErrorEntry, JobFailure, JobRecord, now_epoch_ms};
use fleet_jobs::{JobManager, spawn_job};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PowerSweepRequest {
    pub device_id: String,
    pub targets_w: Vec<u32>,
    /// 每档设置后的等待时长
    pub settle: Duration,
    pub restore_original: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSweepPhase {
    pub target_w: u32,
    pub success: bool,
    #[serde(default)]
    pub hashrate_ths: Option<f64>,
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub power_w: Option<f64>,
    #[serde(default)]
    pub efficiency_th_per_kw: Option<f64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSweepReport {
    pub device_id: String,
    #[serde(default)]
    pub original_target_w: Option<u32>,
    pub phases: Vec<PowerSweepPhase>,
    #[serde(default)]
    pub best_target_w: Option<u32>,
    #[serde(default)]
    pub best_efficiency_th_per_kw: Option<f64>,
    pub restored: bool,
}

/// 创建功率扫描任务并在后台执行，立即返回 `pending` 任务记录。
pub async fn start_power_sweep(
    jobs: Arc<JobManager>,
    control: DeviceControlService,
    request: PowerSweepRequest,
) -> Result<JobRecord, ControlError> {
    if request.targets_w.is_empty() {
        return Err(DeviceError::Validation("targets_w required".to_string()).into());
    }
    for watts in &request.targets_w {
        control.validate(&DeviceOperation::SetPowerTarget { watts: *watts })?;
    }
    control.find_device(&request.device_id).await?;

    let metadata = serde_json::json!({
        "device_id": request.device_id,
        "targets_w": request.targets_w,
        "settle_ms": request.settle.as_millis() as u64,
        "restore_original": request.restore_original,
    });
    let job = jobs
        .create_job("power_sweep", request.targets_w.len() as u64, metadata)
        .await?;
    spawn_job(
        jobs.clone(),
        job.job_id.clone(),
        run_sweep(jobs, control, job.job_id.clone(), request),
    );
    Ok(job)
}

async fn run_sweep(
    jobs: Arc<JobManager>,
    control: DeviceControlService,
    job_id: String,
    request: PowerSweepRequest,
) -> Result<(), JobFailure> {
    let device_id = request.device_id.as_str();
    let baseline = control
        .cache()
        .get_status(device_id, true)
        .await
        .map_err(|err| {
            JobFailure::new(
                format!("baseline status unavailable: {err}"),
                err.suggestion(),
            )
        })?;
    let original_target_w = baseline.status.power_target_w;

    let mut phases = Vec::with_capacity(request.targets_w.len());
    let (mut completed, mut failed) = (0u64, 0u64);
    for (index, target_w) in request.targets_w.iter().copied().enumerate() {
        match run_phase(&control, device_id, target_w, request.settle).await {
            Ok(phase) => {
                completed += 1;
                info!(
                    target: "fleet.control",
                    job_id = %job_id,
                    device_id = %device_id,
                    target_w,
                    efficiency = phase.efficiency_th_per_kw.unwrap_or_default(),
                    "power_sweep_phase_recorded"
                );
                phases.push(phase);
            }
            Err(err) => {
                failed += 1;
                jobs.add_error(
                    &job_id,
                    JobErrorEntry {
                        error: err.to_string(),
                        suggestion: Some(err.suggestion().to_string()),
                        unit: Some(format!("phase {}: {}W", index + 1, target_w)),
                        timestamp_ms: now_epoch_ms(),
                    },
                )
                .await?;
                phases.push(PowerSweepPhase {
                    target_w,
                    success: false,
                    hashrate_ths: None,
                    temperature_c: None,
                    power_w: None,
                    efficiency_th_per_kw: None,
                    error: Some(err.to_string()),
                });
            }
        }
        jobs.update_progress(&job_id, completed, failed).await?;
    }

    let restored = match (request.restore_original, original_target_w) {
        (true, Some(watts)) => match control.set_power_target(device_id, watts).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    target: "fleet.control",
                    job_id = %job_id,
                    device_id = %device_id,
                    error = %err,
                    "power_sweep_restore_failed"
                );
                jobs.add_error(
                    &job_id,
                    JobErrorEntry {
                        error: format!("restoring power target {watts}W failed: {err}"),
                        suggestion: Some(format!("set the power target back to {watts}W manually")),
                        unit: Some("restore".to_string()),
                        timestamp_ms: now_epoch_ms(),
                    },
                )
                .await?;
                false
            }
        },
        _ => false,
    };

    let best = best_phase(&phases);
    let best_target_w = best.map(|phase| phase.target_w);
    let best_efficiency_th_per_kw = best.and_then(|phase| phase.efficiency_th_per_kw);
    let report = PowerSweepReport {
        device_id: device_id.to_string(),
        original_target_w,
        best_target_w,
        best_efficiency_th_per_kw,
        phases,
        restored,
    };
    let results = serde_json::to_value(&report).map_err(|err| {
        JobFailure::new(
            format!("power sweep report encoding failed: {err}"),
            "check service logs for details",
        )
    })?;
    jobs.set_results(&job_id, results).await?;
    info!(
        target: "fleet.control",
        job_id = %job_id,
        device_id = %device_id,
        best_target_w = ?report.best_target_w,
        restored,
        "power_sweep_finished"
    );
    Ok(())
}

async fn run_phase(
    control: &DeviceControlService,
    device_id: &str,
    target_w: u32,
    settle: Duration,
) -> Result<PowerSweepPhase, DeviceError> {
    control.set_power_target(device_id, target_w).await?;
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    let snapshot = control.cache().get_status(device_id, true).await?;
    let status = snapshot.status;
    Ok(PowerSweepPhase {
        target_w,
        success: true,
        hashrate_ths: Some(status.hashrate_ths),
        temperature_c: status.temperature_c,
        power_w: status.power_w,
        efficiency_th_per_kw: status.efficiency_th_per_kw(),
        error: None,
    })
}

/// 能效最高的成功档位；能效相同时取先出现的一档。
fn best_phase(phases: &[PowerSweepPhase]) -> Option<&PowerSweepPhase> {
    phases
        .iter()
        .filter(|phase| phase.success)
        .filter_map(|phase| phase.efficiency_th_per_kw.map(|eff| (eff, phase)))
        .fold(None, |best: Option<(f64, &PowerSweepPhase)>, (eff, phase)| match best {
            Some((best_eff, _)) if best_eff >= eff => best,
            _ => Some((eff, phase)),
        })
        .map(|(_, phase)| phase)
}
