//! 远程调用网关。
//!
//! 每个设备 key（`host:port`）最多一个通道，首次使用时创建并缓存；
//! 可重试失败会丢弃该通道，下次尝试重新建立。

use crate::retry::RetryPolicy;
use crate::transport::{DeviceChannel, DeviceConnector};
use domain::{DeviceError, DeviceOperation, DeviceRegistration};
use fleet_session::SessionManager;
use fleet_telemetry::{
    record_connection_opened, record_remote_call, record_remote_call_failure, record_remote_retry,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct RemoteGateway {
    connector: Arc<dyn DeviceConnector>,
    sessions: Arc<SessionManager>,
    policy: RetryPolicy,
    channels: RwLock<HashMap<String, Arc<dyn DeviceChannel>>>,
    connect_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl RemoteGateway {
    pub fn new(
        connector: Arc<dyn DeviceConnector>,
        sessions: Arc<SessionManager>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            connector,
            sessions,
            policy,
            channels: RwLock::new(HashMap::new()),
            connect_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// 执行一次设备操作（含登录、超时与重试）。
    pub async fn execute(
        &self,
        device: &DeviceRegistration,
        operation: &DeviceOperation,
    ) -> Result<serde_json::Value, DeviceError> {
        let key = device.device_key();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started_at = Instant::now();
            let err = match self.attempt(device, &key, operation).await {
                Ok(value) => {
                    let latency_ms = started_at.elapsed().as_millis() as u64;
                    record_remote_call(latency_ms);
                    debug!(
                        target: "fleet.gateway",
                        device = %key,
                        device_id = %device.device_id,
                        operation = operation.method(),
                        attempt,
                        latency_ms,
                        "remote_call_succeeded"
                    );
                    return Ok(value);
                }
                Err(err) => err,
            };

            if err.is_authentication() {
                self.sessions.invalidate(&key);
                record_remote_call_failure();
                warn!(
                    target: "fleet.gateway",
                    device = %key,
                    device_id = %device.device_id,
                    operation = operation.method(),
                    error = %err,
                    "remote_call_unauthenticated"
                );
                return Err(err);
            }

            if !err.is_retryable() {
                record_remote_call_failure();
                warn!(
                    target: "fleet.gateway",
                    device = %key,
                    device_id = %device.device_id,
                    operation = operation.method(),
                    code = err.code(),
                    error = %err,
                    "remote_call_rejected"
                );
                return Err(err);
            }

            if attempt >= self.policy.max_attempts {
                record_remote_call_failure();
                warn!(
                    target: "fleet.gateway",
                    device = %key,
                    device_id = %device.device_id,
                    operation = operation.method(),
                    attempts = attempt,
                    error = %err,
                    "remote_call_exhausted"
                );
                return Err(DeviceError::Connection {
                    device: key,
                    attempts: attempt,
                    last_error: failure_reason(&err),
                });
            }

            let delay = self.policy.delay_after(attempt);
            record_remote_retry();
            warn!(
                target: "fleet.gateway",
                device = %key,
                device_id = %device.device_id,
                operation = operation.method(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "remote_call_retry"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// 关闭设备通道；不存在时返回 false。
    pub async fn close(&self, device_key: &str) -> bool {
        let removed = self
            .channels
            .write()
            .ok()
            .and_then(|mut map| map.remove(device_key));
        match removed {
            Some(channel) => {
                channel.close().await;
                info!(target: "fleet.gateway", device = %device_key, "device_channel_closed");
                true
            }
            None => false,
        }
    }

    /// 设备注销：关闭通道并丢弃该设备的连接锁与会话。
    pub async fn forget(&self, device_key: &str) -> bool {
        let closed = self.close(device_key).await;
        if let Ok(mut locks) = self.connect_locks.lock() {
            locks.remove(device_key);
        }
        self.sessions.forget(device_key);
        closed
    }

    /// 关闭全部通道（进程退出前调用）。
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<dyn DeviceChannel>)> = match self.channels.write() {
            Ok(mut map) => map.drain().collect(),
            Err(_) => Vec::new(),
        };
        let count = drained.len();
        for (_, channel) in drained {
            channel.close().await;
        }
        info!(target: "fleet.gateway", count, "device_channels_closed");
    }

    pub fn is_connected(&self, device_key: &str) -> bool {
        self.channels
            .read()
            .map(|map| map.contains_key(device_key))
            .unwrap_or(false)
    }

    pub fn open_channels(&self) -> usize {
        self.channels.read().map(|map| map.len()).unwrap_or(0)
    }

    /// 持有连接锁的设备数。
    pub fn tracked_devices(&self) -> usize {
        self.connect_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    async fn attempt(
        &self,
        device: &DeviceRegistration,
        key: &str,
        operation: &DeviceOperation,
    ) -> Result<serde_json::Value, DeviceError> {
        let timeout = self.policy.call_timeout;
        let channel = tokio::time::timeout(timeout, self.channel(device, key))
            .await
            .map_err(|_| self.timeout_error(key))??;

        let result = tokio::time::timeout(timeout, self.invoke(&channel, device, key, operation))
            .await
            .unwrap_or_else(|_| Err(self.timeout_error(key)));
        if matches!(&result, Err(err) if err.is_retryable()) {
            self.evict(key, &channel).await;
        }
        result
    }

    async fn invoke(
        &self,
        channel: &Arc<dyn DeviceChannel>,
        device: &DeviceRegistration,
        key: &str,
        operation: &DeviceOperation,
    ) -> Result<serde_json::Value, DeviceError> {
        let token = self
            .sessions
            .get_token(key, || channel.login(&device.credentials))
            .await?;
        channel.call(&token, operation).await
    }

    async fn channel(
        &self,
        device: &DeviceRegistration,
        key: &str,
    ) -> Result<Arc<dyn DeviceChannel>, DeviceError> {
        if let Some(channel) = self.cached_channel(key) {
            return Ok(channel);
        }

        let lock = self.connect_lock(key)?;
        let _guard = lock.lock().await;
        if let Some(channel) = self.cached_channel(key) {
            return Ok(channel);
        }

        let channel = self.connector.connect(device).await?;
        record_connection_opened();
        self.channels
            .write()
            .map_err(|_| DeviceError::Internal("gateway lock failed".to_string()))?
            .insert(key.to_string(), channel.clone());
        info!(
            target: "fleet.gateway",
            device = %key,
            device_id = %device.device_id,
            "device_channel_opened"
        );
        Ok(channel)
    }

    fn cached_channel(&self, key: &str) -> Option<Arc<dyn DeviceChannel>> {
        self.channels.read().ok()?.get(key).cloned()
    }

    fn connect_lock(&self, key: &str) -> Result<Arc<tokio::sync::Mutex<()>>, DeviceError> {
        let mut locks = self
            .connect_locks
            .lock()
            .map_err(|_| DeviceError::Internal("gateway lock failed".to_string()))?;
        Ok(locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    /// 仅当缓存中仍是同一通道时移除（避免误删其他请求新建的通道）。
    async fn evict(&self, key: &str, channel: &Arc<dyn DeviceChannel>) {
        let removed = match self.channels.write() {
            Ok(mut map) => {
                let same = map
                    .get(key)
                    .is_some_and(|cached| Arc::ptr_eq(cached, channel));
                if same { map.remove(key) } else { None }
            }
            Err(_) => None,
        };
        if let Some(channel) = removed {
            channel.close().await;
            debug!(target: "fleet.gateway", device = %key, "device_channel_evicted");
        }
    }

    fn timeout_error(&self, key: &str) -> DeviceError {
        DeviceError::Timeout {
            device: key.to_string(),
            timeout_ms: self.policy.call_timeout.as_millis() as u64,
        }
    }
}

fn failure_reason(err: &DeviceError) -> String {
    match err {
        DeviceError::Connection { last_error, .. } => last_error.clone(),
        other => other.to_string(),
    }
}
