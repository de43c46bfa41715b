//! 模拟设备。
//!
//! 按设备 key 维护状态（功率目标、冷却模式、启动时间），并统计连接、登录与调用次数，
//! 可注入不可达、登录拒绝、离线、忙与连续连接失败等故障。
//!
//! 算力模型：能效随功率目标升高而下降（`45 - 3 * kW` TH/kW），实际功耗为目标的 98%。

use crate::transport::{DeviceChannel, DeviceConnector};
use async_trait::async_trait;
use domain::{
    CoolingMode, DeviceCredentials, DeviceError, DeviceOperation, DeviceRegistration,
    DeviceStatus,
};
use fleet_session::LoginGrant;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// 模拟设备的行为。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulatedBehavior {
    #[default]
    Healthy,
    /// 连接与调用均返回连接失败
    Unreachable,
    /// 登录被拒绝
    RejectLogin,
    /// 设备报告离线
    Offline,
    /// 设备报告忙
    Busy,
}

#[derive(Debug)]
struct SimulatedDevice {
    behavior: SimulatedBehavior,
    power_target_w: u32,
    min_power_w: u32,
    max_power_w: u32,
    cooling_mode: CoolingMode,
    booted_at: Instant,
    boot_count: u64,
    latency: Duration,
    fail_next_calls: u32,
    active_token: Option<String>,
    token_seq: u64,
    connects: u64,
    logins: u64,
    calls: u64,
}

impl SimulatedDevice {
    fn new(settings: &SimulatorSettings) -> Self {
        Self {
            behavior: SimulatedBehavior::Healthy,
            power_target_w: settings.default_power_w,
            min_power_w: settings.min_power_w,
            max_power_w: settings.max_power_w,
            cooling_mode: CoolingMode::Auto,
            booted_at: Instant::now(),
            boot_count: 1,
            latency: Duration::ZERO,
            fail_next_calls: 0,
            active_token: None,
            token_seq: 0,
            connects: 0,
            logins: 0,
            calls: 0,
        }
    }

    fn status(&self) -> DeviceStatus {
        let target_kw = f64::from(self.power_target_w) / 1000.0;
        let power_w = f64::from(self.power_target_w) * 0.98;
        let efficiency = (45.0 - 3.0 * target_kw).max(1.0);
        DeviceStatus {
            hashrate_ths: round2(efficiency * power_w / 1000.0),
            temperature_c: Some(round2(40.0 + 8.0 * target_kw)),
            power_w: Some(round2(power_w)),
            power_target_w: Some(self.power_target_w),
            cooling_mode: Some(self.cooling_mode.as_str().to_string()),
            uptime_s: Some(self.booted_at.elapsed().as_secs()),
        }
    }
}

#[derive(Debug, Clone)]
struct SimulatorSettings {
    token_timeout_s: u64,
    min_power_w: u32,
    max_power_w: u32,
    default_power_w: u32,
}

/// 模拟设备连接器。
#[derive(Clone)]
pub struct SimulatedConnector {
    settings: SimulatorSettings,
    devices: Arc<Mutex<HashMap<String, SimulatedDevice>>>,
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedConnector {
    pub fn new() -> Self {
        Self {
            settings: SimulatorSettings {
                token_timeout_s: 3600,
                min_power_w: 1000,
                max_power_w: 5000,
                default_power_w: 3000,
            },
            devices: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_token_timeout(mut self, timeout_s: u64) -> Self {
        self.settings.token_timeout_s = timeout_s;
        self
    }

    /// 默认的功率目标范围（含边界），超出时设备返回参数错误。
    pub fn with_power_limits(mut self, min_w: u32, max_w: u32) -> Self {
        self.settings.min_power_w = min_w;
        self.settings.max_power_w = max_w;
        self
    }

    pub fn set_behavior(&self, device_key: &str, behavior: SimulatedBehavior) {
        self.with_device(device_key, |device| device.behavior = behavior);
    }

    /// 单台设备的功率目标范围（例如不同机型）。
    pub fn set_power_limits(&self, device_key: &str, min_w: u32, max_w: u32) {
        self.with_device(device_key, |device| {
            device.min_power_w = min_w;
            device.max_power_w = max_w;
        });
    }

    /// 接下来 `count` 次调用返回连接失败。
    pub fn fail_next_calls(&self, device_key: &str, count: u32) {
        self.with_device(device_key, |device| device.fail_next_calls = count);
    }

    /// 每次调用的响应延迟。
    pub fn set_latency(&self, device_key: &str, latency: Duration) {
        self.with_device(device_key, |device| device.latency = latency);
    }

    /// 设备侧吊销已发放的 token（模拟提前过期）。
    pub fn revoke_tokens(&self, device_key: &str) {
        self.with_device(device_key, |device| device.active_token = None);
    }

    pub fn connects(&self, device_key: &str) -> u64 {
        self.read_device(device_key, |device| device.connects)
    }

    pub fn logins(&self, device_key: &str) -> u64 {
        self.read_device(device_key, |device| device.logins)
    }

    pub fn calls(&self, device_key: &str) -> u64 {
        self.read_device(device_key, |device| device.calls)
    }

    pub fn boot_count(&self, device_key: &str) -> u64 {
        self.read_device(device_key, |device| device.boot_count)
    }

    pub fn power_target(&self, device_key: &str) -> u32 {
        self.read_device(device_key, |device| device.power_target_w)
    }

    fn with_device<R>(&self, device_key: &str, f: impl FnOnce(&mut SimulatedDevice) -> R) -> R {
        let mut devices = self
            .devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let device = devices
            .entry(device_key.to_string())
            .or_insert_with(|| SimulatedDevice::new(&self.settings));
        f(device)
    }

    fn read_device<R: Default>(&self, device_key: &str, f: impl FnOnce(&SimulatedDevice) -> R) -> R {
        self.devices
            .lock()
            .ok()
            .and_then(|devices| devices.get(device_key).map(f))
            .unwrap_or_default()
    }
}

#[async_trait]
impl DeviceConnector for SimulatedConnector {
    async fn connect(
        &self,
        device: &DeviceRegistration,
    ) -> Result<Arc<dyn DeviceChannel>, DeviceError> {
        let key = device.device_key();
        let behavior = self.with_device(&key, |state| {
            state.connects += 1;
            state.behavior
        });
        if behavior == SimulatedBehavior::Unreachable {
            return Err(DeviceError::connection(&key, "connection refused"));
        }
        Ok(Arc::new(SimulatedChannel {
            key,
            connector: self.clone(),
        }))
    }
}

struct SimulatedChannel {
    key: String,
    connector: SimulatedConnector,
}

impl SimulatedChannel {
    async fn simulate_latency(&self) {
        let latency = self.connector.read_device(&self.key, |device| device.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn apply(&self, token: &str, operation: &DeviceOperation) -> Result<serde_json::Value, DeviceError> {
        let key = self.key.clone();
        self.connector.with_device(&self.key, |device| {
            device.calls += 1;
            match device.behavior {
                SimulatedBehavior::Unreachable => {
                    return Err(DeviceError::connection(&key, "connection reset by peer"));
                }
                SimulatedBehavior::Offline => {
                    return Err(DeviceError::Offline {
                        device: key,
                        reason: "hashboards not responding".to_string(),
                    });
                }
                SimulatedBehavior::Busy => {
                    return Err(DeviceError::Busy {
                        device: key,
                        reason: "firmware update in progress".to_string(),
                    });
                }
                SimulatedBehavior::Healthy | SimulatedBehavior::RejectLogin => {}
            }
            if device.fail_next_calls > 0 {
                device.fail_next_calls -= 1;
                return Err(DeviceError::connection(&key, "connection reset by peer"));
            }
            if device.active_token.as_deref() != Some(token) {
                return Err(DeviceError::Authentication {
                    device: key,
                    reason: "token expired or invalid".to_string(),
                });
            }

            match operation {
                DeviceOperation::GetStatus => serde_json::to_value(device.status())
                    .map_err(|err| DeviceError::Internal(err.to_string())),
                DeviceOperation::SetPowerTarget { watts } => {
                    if *watts < device.min_power_w || *watts > device.max_power_w {
                        return Err(DeviceError::Validation(format!(
                            "power target {}W outside {}W..={}W",
                            watts, device.min_power_w, device.max_power_w
                        )));
                    }
                    let previous = device.power_target_w;
                    device.power_target_w = *watts;
                    Ok(serde_json::json!({ "previous_w": previous, "power_target_w": watts }))
                }
                DeviceOperation::SetCoolingMode { mode } => {
                    device.cooling_mode = *mode;
                    Ok(serde_json::json!({ "cooling_mode": mode.as_str() }))
                }
                DeviceOperation::Reboot => {
                    device.booted_at = Instant::now();
                    device.boot_count += 1;
                    Ok(serde_json::json!({ "rebooting": true }))
                }
            }
        })
    }
}

#[async_trait]
impl DeviceChannel for SimulatedChannel {
    async fn login(&self, credentials: &DeviceCredentials) -> Result<LoginGrant, DeviceError> {
        self.simulate_latency().await;
        let timeout_s = self.connector.settings.token_timeout_s;
        let key = self.key.clone();
        let username = credentials.username.clone();
        self.connector.with_device(&self.key, |device| match device.behavior {
            SimulatedBehavior::Unreachable => {
                Err(DeviceError::connection(&key, "connection reset by peer"))
            }
            SimulatedBehavior::RejectLogin => Err(DeviceError::Authentication {
                device: key,
                reason: format!("invalid credentials for user {username}"),
            }),
            _ => {
                device.logins += 1;
                device.token_seq += 1;
                let token = format!("sim-{}-{}", key, device.token_seq);
                device.active_token = Some(token.clone());
                Ok(LoginGrant { token, timeout_s })
            }
        })
    }

    async fn call(
        &self,
        token: &str,
        operation: &DeviceOperation,
    ) -> Result<serde_json::Value, DeviceError> {
        self.simulate_latency().await;
        self.apply(token, operation)
    }

    async fn close(&self) {}
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
