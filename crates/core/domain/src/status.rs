//! 设备状态快照。

use serde::{Deserialize, Serialize};

/// 设备上报的运行状态（get_status 的返回体）。
///
/// 设备固件版本不同，字段可能缺失；缺失字段按 `None` 处理，不参与聚合。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// 当前算力（TH/s）
    #[serde(default)]
    pub hashrate_ths: f64,
    /// 芯片最高温度（摄氏度）
    #[serde(default)]
    pub temperature_c: Option<f64>,
    /// 实际功耗（瓦）
    #[serde(default)]
    pub power_w: Option<f64>,
    /// 当前功率目标（瓦）
    #[serde(default)]
    pub power_target_w: Option<u32>,
    /// 散热模式
    #[serde(default)]
    pub cooling_mode: Option<String>,
    /// 运行时长（秒）
    #[serde(default)]
    pub uptime_s: Option<u64>,
}

impl DeviceStatus {
    /// 能效（TH/s 每千瓦），功耗未知或为 0 时返回 None。
    pub fn efficiency_th_per_kw(&self) -> Option<f64> {
        match self.power_w {
            Some(power) if power > 0.0 => Some(self.hashrate_ths / (power / 1000.0)),
            _ => None,
        }
    }
}

/// 状态缓存中的一条快照。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub device_id: String,
    pub status: DeviceStatus,
    pub fetched_at_ms: i64,
    pub ttl_ms: u64,
}

impl StatusSnapshot {
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.fetched_at_ms).max(0)
    }
}
