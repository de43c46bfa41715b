//! 设备状态快照缓存。
//!
//! 快照以 JSON 存入 `KvStore`（键 `status:{device_id}`），过期由存储层 TTL 保证。
//! 同一设备的并发未命中共享第一次拉取的结果。
//!
//! 每台设备维护一个代数（generation），`invalidate` 递增代数并丢弃进行中的拉取；
//! 拉取只在代数未变时写回，失效之前发起的拉取不会把旧快照写入缓存。
//! 任意设备失效同时递增全局纪元（epoch），集群汇总以纪元为键的一部分。

use domain::{DeviceError, DeviceOperation, DeviceStatus, StatusSnapshot, now_epoch_ms};
use fleet_gateway::RemoteGateway;
use fleet_storage::{DeviceStore, KvStore, StorageError};
use fleet_telemetry::{record_status_cache_hit, record_status_cache_miss};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

type FetchCell = Arc<OnceCell<Result<StatusSnapshot, DeviceError>>>;

#[derive(Default)]
struct FillState {
    /// 进行中的拉取及其发起时的代数
    in_flight: HashMap<String, (u64, FetchCell)>,
    generations: HashMap<String, u64>,
}

impl FillState {
    fn generation(&self, device_id: &str) -> u64 {
        self.generations.get(device_id).copied().unwrap_or_default()
    }
}

pub struct StatusCache {
    devices: Arc<dyn DeviceStore>,
    gateway: Arc<RemoteGateway>,
    kv: Arc<dyn KvStore>,
    ttl: Duration,
    state: Mutex<FillState>,
    epoch: AtomicU64,
}

impl StatusCache {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        gateway: Arc<RemoteGateway>,
        kv: Arc<dyn KvStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            devices,
            gateway,
            kv,
            ttl,
            state: Mutex::new(FillState::default()),
            epoch: AtomicU64::new(0),
        }
    }

    /// 读取设备状态。
    ///
    /// TTL 内且未强制刷新时直接返回缓存，不访问设备；否则经网关拉取并写回缓存。
    pub async fn get_status(
        &self,
        device_id: &str,
        force_refresh: bool,
    ) -> Result<StatusSnapshot, DeviceError> {
        if !force_refresh {
            if let Some(snapshot) = self.cached(device_id).await {
                record_status_cache_hit();
                debug!(target: "fleet.status", device_id = %device_id, "status_cache_hit");
                return Ok(snapshot);
            }
        }
        record_status_cache_miss();

        if force_refresh {
            let generation = self.lock_state()?.generation(device_id);
            return self.fetch_and_store(device_id, generation).await;
        }

        let (generation, cell) = self.fetch_cell(device_id)?;
        let result = cell
            .get_or_init(|| self.fetch_and_store(device_id, generation))
            .await
            .clone();
        self.release_cell(device_id, &cell);
        result
    }

    /// 立即移除设备的缓存快照；之后的读取必定重新拉取。
    pub async fn invalidate(&self, device_id: &str) -> Result<bool, DeviceError> {
        {
            let mut state = self.lock_state()?;
            *state.generations.entry(device_id.to_string()).or_default() += 1;
            state.in_flight.remove(device_id);
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let removed = self
            .kv
            .delete(&status_key(device_id))
            .await
            .map_err(storage_error)?;
        if removed {
            debug!(target: "fleet.status", device_id = %device_id, "status_cache_invalidated");
        }
        Ok(removed)
    }

    /// 全局纪元；每次 `invalidate` 后递增。
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    async fn cached(&self, device_id: &str) -> Option<StatusSnapshot> {
        let raw = match self.kv.get(&status_key(device_id)).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(target: "fleet.status", device_id = %device_id, error = %err, "status_cache_read_failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(target: "fleet.status", device_id = %device_id, error = %err, "status_cache_entry_corrupt");
                None
            }
        }
    }

    async fn fetch_and_store(
        &self,
        device_id: &str,
        generation: u64,
    ) -> Result<StatusSnapshot, DeviceError> {
        let device = self
            .devices
            .find_device(device_id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))?;

        let value = self
            .gateway
            .execute(&device, &DeviceOperation::GetStatus)
            .await?;
        let status: DeviceStatus = serde_json::from_value(value).map_err(|err| {
            DeviceError::Internal(format!("malformed status from {device_id}: {err}"))
        })?;
        let snapshot = StatusSnapshot {
            device_id: device_id.to_string(),
            status,
            fetched_at_ms: now_epoch_ms(),
            ttl_ms: self.ttl.as_millis() as u64,
        };

        if self.is_current(device_id, generation) {
            self.store(&snapshot, generation).await;
        } else {
            debug!(target: "fleet.status", device_id = %device_id, "status_fill_superseded");
        }
        info!(
            target: "fleet.status",
            device_id = %device_id,
            hashrate_ths = snapshot.status.hashrate_ths,
            "status_refreshed"
        );
        Ok(snapshot)
    }

    async fn store(&self, snapshot: &StatusSnapshot, generation: u64) {
        let device_id = snapshot.device_id.as_str();
        let key = status_key(device_id);
        let raw = match serde_json::to_string(snapshot) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(target: "fleet.status", device_id = %device_id, error = %err, "status_cache_encode_failed");
                return;
            }
        };
        if let Err(err) = self.kv.put(&key, raw, Some(self.ttl)).await {
            warn!(target: "fleet.status", device_id = %device_id, error = %err, "status_cache_write_failed");
            return;
        }
        // 写入期间发生了失效：撤回刚写入的快照
        if !self.is_current(device_id, generation) {
            if let Err(err) = self.kv.delete(&key).await {
                warn!(target: "fleet.status", device_id = %device_id, error = %err, "status_cache_invalidate_failed");
            }
        }
    }

    fn is_current(&self, device_id: &str, generation: u64) -> bool {
        self.state
            .lock()
            .map(|state| state.generation(device_id) == generation)
            .unwrap_or(false)
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, FillState>, DeviceError> {
        self.state
            .lock()
            .map_err(|_| DeviceError::Internal("status cache lock failed".to_string()))
    }

    fn fetch_cell(&self, device_id: &str) -> Result<(u64, FetchCell), DeviceError> {
        let mut state = self.lock_state()?;
        let generation = state.generation(device_id);
        let (generation, cell) = state
            .in_flight
            .entry(device_id.to_string())
            .or_insert_with(|| (generation, Arc::new(OnceCell::new())));
        Ok((*generation, cell.clone()))
    }

    fn release_cell(&self, device_id: &str, cell: &FetchCell) {
        if let Ok(mut state) = self.state.lock() {
            let same = state
                .in_flight
                .get(device_id)
                .is_some_and(|(_, current)| Arc::ptr_eq(current, cell));
            if same {
                state.in_flight.remove(device_id);
            }
        }
    }
}

fn status_key(device_id: &str) -> String {
    format!("status:{device_id}")
}

fn storage_error(err: StorageError) -> DeviceError {
    DeviceError::Internal(err.to_string())
}
