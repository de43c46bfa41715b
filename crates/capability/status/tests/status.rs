use async_trait::async_trait;
use domain::{
    DeviceCredentials, DeviceError, DeviceFilter, DeviceOperation, DeviceRegistration,
};
use fleet_gateway::{
    DeviceChannel, DeviceConnector, RemoteGateway, RetryPolicy, SimulatedBehavior,
    SimulatedConnector,
};
use fleet_session::{LoginGrant, SessionConfig, SessionManager};
use fleet_status::{FleetAggregator, StatusCache};
use fleet_storage::{DeviceStore, InMemoryDeviceStore, InMemoryKvStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

struct Harness {
    simulator: SimulatedConnector,
    devices: Arc<InMemoryDeviceStore>,
    cache: Arc<StatusCache>,
    fleet: FleetAggregator,
}

fn device(id: &str, port: u16, tags: &[&str]) -> DeviceRegistration {
    DeviceRegistration {
        device_id: id.to_string(),
        host: "10.0.0.1".to_string(),
        port,
        credentials: DeviceCredentials::new("root", "root"),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}

fn harness() -> Harness {
    let simulator = SimulatedConnector::new();
    let sessions = Arc::new(SessionManager::new(SessionConfig::default()));
    let gateway = Arc::new(RemoteGateway::new(
        Arc::new(simulator.clone()),
        sessions,
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(1000),
            call_timeout: Duration::from_millis(500),
        },
    ));
    let devices = Arc::new(InMemoryDeviceStore::new());
    let kv = Arc::new(InMemoryKvStore::new());
    let cache = Arc::new(StatusCache::new(
        devices.clone(),
        gateway,
        kv.clone(),
        Duration::from_secs(30),
    ));
    let fleet = FleetAggregator::new(devices.clone(), cache.clone(), kv, Duration::from_secs(60));
    Harness {
        simulator,
        devices,
        cache,
        fleet,
    }
}

#[tokio::test(start_paused = true)]
async fn reads_within_ttl_fetch_once() {
    let h = harness();
    let rig = device("rig-1", 50051, &[]);
    let key = rig.device_key();
    h.devices.register_device(rig).await.expect("register");

    let first = h.cache.get_status("rig-1", false).await.expect("first");
    tokio::time::advance(Duration::from_secs(10)).await;
    let second = h.cache.get_status("rig-1", false).await.expect("second");
    assert_eq!(first, second);
    assert_eq!(h.simulator.calls(&key), 1);

    // TTL 到期后重新拉取
    tokio::time::advance(Duration::from_secs(20)).await;
    h.cache.get_status("rig-1", false).await.expect("expired");
    assert_eq!(h.simulator.calls(&key), 2);
}

#[tokio::test]
async fn force_refresh_always_fetches() {
    let h = harness();
    let rig = device("rig-1", 50051, &[]);
    let key = rig.device_key();
    h.devices.register_device(rig).await.expect("register");

    for _ in 0..3 {
        h.cache.get_status("rig-1", true).await.expect("forced");
    }
    assert_eq!(h.simulator.calls(&key), 3);

    // 强制刷新也会写回缓存
    h.cache.get_status("rig-1", false).await.expect("cached");
    assert_eq!(h.simulator.calls(&key), 3);
}

#[tokio::test]
async fn invalidate_drops_snapshot() {
    let h = harness();
    let rig = device("rig-1", 50051, &[]);
    let key = rig.device_key();
    h.devices.register_device(rig).await.expect("register");

    h.cache.get_status("rig-1", false).await.expect("first");
    assert!(h.cache.invalidate("rig-1").await.expect("invalidate"));
    assert!(!h.cache.invalidate("rig-1").await.expect("again"));
    h.cache.get_status("rig-1", false).await.expect("refetch");
    assert_eq!(h.simulator.calls(&key), 2);
}

/// 读取状态时先采样功率目标，再等待 100ms 才应答。
#[derive(Clone)]
struct SlowStatusDevice {
    power_target_w: Arc<AtomicU32>,
}

#[async_trait]
impl DeviceConnector for SlowStatusDevice {
    async fn connect(
        &self,
        _device: &DeviceRegistration,
    ) -> Result<Arc<dyn DeviceChannel>, DeviceError> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl DeviceChannel for SlowStatusDevice {
    async fn login(&self, _credentials: &DeviceCredentials) -> Result<LoginGrant, DeviceError> {
        Ok(LoginGrant {
            token: "token".to_string(),
            timeout_s: 3600,
        })
    }

    async fn call(
        &self,
        _token: &str,
        operation: &DeviceOperation,
    ) -> Result<serde_json::Value, DeviceError> {
        match operation {
            DeviceOperation::GetStatus => {
                let sampled = self.power_target_w.load(Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(serde_json::json!({ "hashrate_ths": 100.0, "power_target_w": sampled }))
            }
            DeviceOperation::SetPowerTarget { watts } => {
                self.power_target_w.store(*watts, Ordering::SeqCst);
                Ok(serde_json::json!({ "power_target_w": watts }))
            }
            _ => Ok(serde_json::json!({})),
        }
    }

    async fn close(&self) {}
}

#[tokio::test(start_paused = true)]
async fn invalidate_supersedes_fill_in_flight() {
    let slow = SlowStatusDevice {
        power_target_w: Arc::new(AtomicU32::new(3000)),
    };
    let gateway = Arc::new(RemoteGateway::new(
        Arc::new(slow),
        Arc::new(SessionManager::new(SessionConfig::default())),
        RetryPolicy {
            call_timeout: Duration::from_secs(1),
            ..RetryPolicy::default()
        },
    ));
    let devices = Arc::new(InMemoryDeviceStore::new());
    let cache = Arc::new(StatusCache::new(
        devices.clone(),
        gateway.clone(),
        Arc::new(InMemoryKvStore::new()),
        Duration::from_secs(30),
    ));
    let rig = device("rig-1", 50051, &[]);
    devices.register_device(rig.clone()).await.expect("register");

    let reader = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_status("rig-1", false).await })
    };
    // 读取方已采样到 3000W，仍在等待应答
    tokio::time::sleep(Duration::from_millis(10)).await;
    gateway
        .execute(&rig, &DeviceOperation::SetPowerTarget { watts: 4000 })
        .await
        .expect("set");
    cache.invalidate("rig-1").await.expect("invalidate");

    let fresh = cache.get_status("rig-1", false).await.expect("fresh");
    assert_eq!(fresh.status.power_target_w, Some(4000));
    let earlier = reader.await.expect("join").expect("earlier");
    assert_eq!(earlier.status.power_target_w, Some(3000));

    tokio::time::sleep(Duration::from_secs(1)).await;
    let cached = cache.get_status("rig-1", false).await.expect("cached");
    assert_eq!(cached.status.power_target_w, Some(4000));
}

#[tokio::test]
async fn unknown_device_is_not_found() {
    let h = harness();
    let err = h.cache.get_status("ghost", false).await.expect_err("missing");
    assert!(matches!(err, DeviceError::NotFound(id) if id == "ghost"));
}

#[tokio::test]
async fn concurrent_misses_share_one_fetch() {
    let h = harness();
    let rig = device("rig-1", 50051, &[]);
    let key = rig.device_key();
    h.devices.register_device(rig).await.expect("register");
    h.simulator.set_latency(&key, Duration::from_millis(30));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let cache = h.cache.clone();
        handles.push(tokio::spawn(async move { cache.get_status("rig-1", false).await }));
    }
    for handle in handles {
        handle.await.expect("join").expect("status");
    }
    assert_eq!(h.simulator.calls(&key), 1);
}

#[tokio::test(start_paused = true)]
async fn fleet_isolates_failing_device() {
    let h = harness();
    for (id, port) in [("rig-a", 50051), ("rig-b", 50052), ("rig-c", 50053)] {
        h.devices
            .register_device(device(id, port, &["site-1"]))
            .await
            .expect("register");
    }
    h.simulator
        .set_behavior("10.0.0.1:50052", SimulatedBehavior::Unreachable);

    let summary = h
        .fleet
        .get_fleet_status(&DeviceFilter::all(), false)
        .await
        .expect("summary");
    assert_eq!(summary.total_devices, 3);
    assert_eq!(summary.reachable, 2);
    assert_eq!(summary.unreachable, 1);
    assert!(summary.total_hashrate_ths > 0.0);

    let failed = summary
        .devices
        .iter()
        .find(|entry| entry.device_id == "rig-b")
        .expect("rig-b entry");
    assert!(!failed.reachable);
    assert_eq!(failed.error_code.as_deref(), Some("DEVICE.CONNECTION"));
    assert!(failed.error.as_deref().unwrap_or_default().contains("connection refused"));
}

#[tokio::test]
async fn fleet_summary_is_cached_per_filter() {
    let h = harness();
    h.devices
        .register_device(device("rig-a", 50051, &["site-1"]))
        .await
        .expect("register a");
    h.devices
        .register_device(device("rig-b", 50052, &["site-2"]))
        .await
        .expect("register b");

    let site1 = DeviceFilter::with_tags(vec!["site-1".to_string()]);
    let first = h.fleet.get_fleet_status(&site1, false).await.expect("first");
    assert_eq!(first.total_devices, 1);
    assert_eq!(h.simulator.calls("10.0.0.1:50052"), 0);

    let again = h.fleet.get_fleet_status(&site1, false).await.expect("cached");
    assert_eq!(first, again);
    assert_eq!(h.simulator.calls("10.0.0.1:50051"), 1);

    let forced = h.fleet.get_fleet_status(&site1, true).await.expect("forced");
    assert_eq!(forced.total_devices, 1);
    assert_eq!(h.simulator.calls("10.0.0.1:50051"), 2);

    let everything = h
        .fleet
        .get_fleet_status(&DeviceFilter::all(), false)
        .await
        .expect("all");
    assert_eq!(everything.total_devices, 2);
}

#[tokio::test]
async fn invalidation_retires_cached_summaries() {
    let h = harness();
    h.devices
        .register_device(device("rig-a", 50051, &[]))
        .await
        .expect("register a");
    h.devices
        .register_device(device("rig-b", 50052, &[]))
        .await
        .expect("register b");

    let all = DeviceFilter::all();
    let first = h.fleet.get_fleet_status(&all, false).await.expect("first");
    assert_eq!(first.total_devices, 2);
    assert_eq!(h.simulator.calls("10.0.0.1:50051"), 1);

    h.cache.invalidate("rig-a").await.expect("invalidate");
    let rebuilt = h.fleet.get_fleet_status(&all, false).await.expect("rebuilt");
    assert_eq!(rebuilt.total_devices, 2);
    assert_eq!(h.simulator.calls("10.0.0.1:50051"), 2);
    // rig-b 的快照仍在 TTL 内
    assert_eq!(h.simulator.calls("10.0.0.1:50052"), 1);

    h.devices.unregister_device("rig-b").await.expect("unregister");
    h.cache.invalidate("rig-b").await.expect("invalidate");
    let shrunk = h.fleet.get_fleet_status(&all, false).await.expect("shrunk");
    assert_eq!(shrunk.total_devices, 1);
    assert_eq!(shrunk.devices[0].device_id, "rig-a");
}
