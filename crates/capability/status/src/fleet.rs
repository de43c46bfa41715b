//! 集群状态聚合。
//!
//! 对过滤后的每台设备并行读取状态；单台失败记为不可达条目并附带原因，不影响整体结果。
//! 汇总结果按纪元与过滤条件缓存（`fleet:summary:{epoch}:{filter}`），强制刷新时绕过；
//! 任一设备的状态缓存失效后，旧纪元下的汇总不再被读取，随 TTL 过期。

use crate::cache::StatusCache;
use domain::{DeviceError, DeviceFilter, DeviceStatus, now_epoch_ms};
use fleet_storage::{DeviceStore, KvStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 集群中单台设备的条目。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetDeviceEntry {
    pub device_id: String,
    pub reachable: bool,
    #[serde(default)]
    pub status: Option<DeviceStatus>,
    #[serde(default)]
    pub fetched_at_ms: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
}

impl FleetDeviceEntry {
    pub fn reachable(device_id: impl Into<String>, status: DeviceStatus, fetched_at_ms: i64) -> Self {
        Self {
            device_id: device_id.into(),
            reachable: true,
            status: Some(status),
            fetched_at_ms: Some(fetched_at_ms),
            error: None,
            error_code: None,
        }
    }

    pub fn unreachable(device_id: impl Into<String>, err: &DeviceError) -> Self {
        Self {
            device_id: device_id.into(),
            reachable: false,
            status: None,
            fetched_at_ms: None,
            error: Some(err.to_string()),
            error_code: Some(err.code().to_string()),
        }
    }
}

/// 集群汇总。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub total_devices: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub total_hashrate_ths: f64,
    /// 仅统计可达且上报了温度的设备
    pub avg_temperature_c: Option<f64>,
    /// 仅统计可达且上报了功耗的设备
    pub avg_power_w: Option<f64>,
    pub generated_at_ms: i64,
    pub devices: Vec<FleetDeviceEntry>,
}

/// 由单设备条目计算汇总（与条目顺序无关）。
pub fn summarize(mut entries: Vec<FleetDeviceEntry>, generated_at_ms: i64) -> FleetSummary {
    entries.sort_by(|a, b| a.device_id.cmp(&b.device_id));

    let reachable: Vec<&DeviceStatus> = entries
        .iter()
        .filter(|entry| entry.reachable)
        .filter_map(|entry| entry.status.as_ref())
        .collect();
    let total_hashrate_ths = reachable.iter().map(|status| status.hashrate_ths).sum();
    let avg_temperature_c = mean(reachable.iter().filter_map(|status| status.temperature_c));
    let avg_power_w = mean(reachable.iter().filter_map(|status| status.power_w));
    let reachable_count = entries.iter().filter(|entry| entry.reachable).count();

    FleetSummary {
        total_devices: entries.len(),
        reachable: reachable_count,
        unreachable: entries.len() - reachable_count,
        total_hashrate_ths,
        avg_temperature_c,
        avg_power_w,
        generated_at_ms,
        devices: entries,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

pub struct FleetAggregator {
    devices: Arc<dyn DeviceStore>,
    cache: Arc<StatusCache>,
    kv: Arc<dyn KvStore>,
    summary_ttl: Duration,
}

impl FleetAggregator {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        cache: Arc<StatusCache>,
        kv: Arc<dyn KvStore>,
        summary_ttl: Duration,
    ) -> Self {
        Self {
            devices,
            cache,
            kv,
            summary_ttl,
        }
    }

    /// 汇总过滤范围内的集群状态。
    ///
    /// 只有设备注册表读取失败才会返回错误；单台设备失败体现在条目中。
    pub async fn get_fleet_status(
        &self,
        filter: &DeviceFilter,
        force_refresh: bool,
    ) -> Result<FleetSummary, DeviceError> {
        let key = summary_key(self.cache.epoch(), filter);
        if !force_refresh {
            if let Some(summary) = self.cached(&key).await {
                return Ok(summary);
            }
        }

        let devices = self
            .devices
            .list_devices(filter)
            .await
            .map_err(|err| DeviceError::Internal(err.to_string()))?;

        let mut handles = Vec::with_capacity(devices.len());
        for device in devices {
            let cache = self.cache.clone();
            let device_id = device.device_id;
            let task_device_id = device_id.clone();
            let handle = tokio::spawn(async move {
                cache.get_status(&task_device_id, force_refresh).await
            });
            handles.push((device_id, handle));
        }

        let mut entries = Vec::with_capacity(handles.len());
        for (device_id, handle) in handles {
            let entry = match handle.await {
                Ok(Ok(snapshot)) => {
                    FleetDeviceEntry::reachable(device_id, snapshot.status, snapshot.fetched_at_ms)
                }
                Ok(Err(err)) => {
                    warn!(
                        target: "fleet.status",
                        device_id = %device_id,
                        code = err.code(),
                        error = %err,
                        "fleet_device_unreachable"
                    );
                    FleetDeviceEntry::unreachable(device_id, &err)
                }
                Err(join_err) => {
                    let err = DeviceError::Internal(format!("status task failed: {join_err}"));
                    warn!(target: "fleet.status", device_id = %device_id, error = %err, "fleet_device_task_failed");
                    FleetDeviceEntry::unreachable(device_id, &err)
                }
            };
            entries.push(entry);
        }

        let summary = summarize(entries, now_epoch_ms());
        info!(
            target: "fleet.status",
            filter = %key,
            total = summary.total_devices,
            reachable = summary.reachable,
            unreachable = summary.unreachable,
            "fleet_summary_built"
        );
        self.store(&key, &summary).await;
        Ok(summary)
    }

    async fn cached(&self, key: &str) -> Option<FleetSummary> {
        let raw = self.kv.get(key).await.ok()??;
        serde_json::from_str(&raw).ok()
    }

    async fn store(&self, key: &str, summary: &FleetSummary) {
        let raw = match serde_json::to_string(summary) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(target: "fleet.status", error = %err, "fleet_summary_encode_failed");
                return;
            }
        };
        if let Err(err) = self.kv.put(key, raw, Some(self.summary_ttl)).await {
            warn!(target: "fleet.status", error = %err, "fleet_summary_write_failed");
        }
    }
}

fn summary_key(epoch: u64, filter: &DeviceFilter) -> String {
    format!("fleet:summary:{epoch}:{}", filter.cache_key())
}
