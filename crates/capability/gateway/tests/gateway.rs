use domain::{DeviceCredentials, DeviceError, DeviceOperation, DeviceRegistration};
use fleet_gateway::{RemoteGateway, RetryPolicy, SimulatedBehavior, SimulatedConnector};
use fleet_session::{SessionConfig, SessionManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn device(id: &str, port: u16) -> DeviceRegistration {
    DeviceRegistration {
        device_id: id.to_string(),
        host: "10.0.0.1".to_string(),
        port,
        credentials: DeviceCredentials::new("root", "root"),
        tags: Vec::new(),
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1000),
        multiplier: 2.0,
        max_backoff: Duration::from_millis(10_000),
        call_timeout: Duration::from_millis(500),
    }
}

fn gateway(simulator: &SimulatedConnector) -> RemoteGateway {
    let sessions = Arc::new(SessionManager::new(SessionConfig::default()));
    RemoteGateway::new(Arc::new(simulator.clone()), sessions, policy())
}

#[tokio::test]
async fn status_call_logs_in_once_and_reuses_channel() {
    let simulator = SimulatedConnector::new();
    let gateway = gateway(&simulator);
    let rig = device("rig-1", 50051);
    let key = rig.device_key();

    for _ in 0..3 {
        let value = gateway
            .execute(&rig, &DeviceOperation::GetStatus)
            .await
            .expect("status");
        assert!(value["hashrate_ths"].as_f64().unwrap_or_default() > 0.0);
    }
    assert_eq!(simulator.connects(&key), 1);
    assert_eq!(simulator.logins(&key), 1);
    assert_eq!(simulator.calls(&key), 3);
    assert!(gateway.is_connected(&key));
}

#[tokio::test(start_paused = true)]
async fn unreachable_device_exhausts_attempts_with_backoff() {
    let simulator = SimulatedConnector::new();
    let gateway = gateway(&simulator);
    let rig = device("rig-1", 50051);
    let key = rig.device_key();
    simulator.set_behavior(&key, SimulatedBehavior::Unreachable);

    let started = Instant::now();
    let err = gateway
        .execute(&rig, &DeviceOperation::GetStatus)
        .await
        .expect_err("unreachable");

    match err {
        DeviceError::Connection {
            device,
            attempts,
            last_error,
        } => {
            assert_eq!(device, key);
            assert_eq!(attempts, 3);
            assert_eq!(last_error, "connection refused");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(simulator.connects(&key), 3);
    // 1000ms + 2000ms，最后一次失败后不再等待
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3000), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");
    assert!(!gateway.is_connected(&key));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_recover_within_attempts() {
    let simulator = SimulatedConnector::new();
    let gateway = gateway(&simulator);
    let rig = device("rig-1", 50051);
    let key = rig.device_key();
    gateway
        .execute(&rig, &DeviceOperation::GetStatus)
        .await
        .expect("warm up");

    simulator.fail_next_calls(&key, 2);
    gateway
        .execute(&rig, &DeviceOperation::GetStatus)
        .await
        .expect("recovers on third attempt");
    assert_eq!(simulator.calls(&key), 4);
    // 每次连接失败都会丢弃通道并重连
    assert_eq!(simulator.connects(&key), 3);
}

#[tokio::test(start_paused = true)]
async fn validation_errors_are_not_retried() {
    let simulator = SimulatedConnector::new().with_power_limits(1000, 4000);
    let gateway = gateway(&simulator);
    let rig = device("rig-1", 50051);
    let key = rig.device_key();

    let started = Instant::now();
    let err = gateway
        .execute(&rig, &DeviceOperation::SetPowerTarget { watts: 9000 })
        .await
        .expect_err("out of range");
    assert!(matches!(err, DeviceError::Validation(_)));
    assert_eq!(simulator.calls(&key), 1);
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert!(gateway.is_connected(&key));
}

#[tokio::test]
async fn rejected_login_surfaces_immediately() {
    let simulator = SimulatedConnector::new();
    let gateway = gateway(&simulator);
    let rig = device("rig-1", 50051);
    let key = rig.device_key();
    simulator.set_behavior(&key, SimulatedBehavior::RejectLogin);

    let err = gateway
        .execute(&rig, &DeviceOperation::GetStatus)
        .await
        .expect_err("rejected");
    assert!(err.is_authentication());
    assert_eq!(simulator.connects(&key), 1);
    assert_eq!(simulator.calls(&key), 0);
}

#[tokio::test]
async fn revoked_token_invalidates_session() {
    let simulator = SimulatedConnector::new();
    let gateway = gateway(&simulator);
    let rig = device("rig-1", 50051);
    let key = rig.device_key();
    gateway
        .execute(&rig, &DeviceOperation::GetStatus)
        .await
        .expect("status");

    simulator.revoke_tokens(&key);
    let err = gateway
        .execute(&rig, &DeviceOperation::GetStatus)
        .await
        .expect_err("revoked");
    assert!(err.is_authentication());
    assert!(gateway.sessions().session(&key).is_none());

    gateway
        .execute(&rig, &DeviceOperation::GetStatus)
        .await
        .expect("fresh login");
    assert_eq!(simulator.logins(&key), 2);
}

#[tokio::test]
async fn offline_device_is_not_retried_in_call() {
    let simulator = SimulatedConnector::new();
    let gateway = gateway(&simulator);
    let rig = device("rig-1", 50051);
    let key = rig.device_key();
    simulator.set_behavior(&key, SimulatedBehavior::Offline);

    let err = gateway
        .execute(&rig, &DeviceOperation::Reboot)
        .await
        .expect_err("offline");
    assert!(matches!(err, DeviceError::Offline { .. }));
    assert_eq!(simulator.calls(&key), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_device_times_out_per_attempt() {
    let simulator = SimulatedConnector::new();
    let gateway = gateway(&simulator);
    let rig = device("rig-1", 50051);
    let key = rig.device_key();
    simulator.set_latency(&key, Duration::from_secs(2));

    let err = gateway
        .execute(&rig, &DeviceOperation::GetStatus)
        .await
        .expect_err("timeout");
    match err {
        DeviceError::Connection {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("timed out"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_calls_share_one_channel() {
    let simulator = SimulatedConnector::new();
    let gateway = Arc::new(gateway(&simulator));
    let rig = device("rig-1", 50051);
    let key = rig.device_key();
    simulator.set_latency(&key, Duration::from_millis(20));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gateway = gateway.clone();
        let rig = rig.clone();
        handles.push(tokio::spawn(async move {
            gateway.execute(&rig, &DeviceOperation::GetStatus).await
        }));
    }
    for handle in handles {
        handle.await.expect("join").expect("status");
    }
    assert_eq!(simulator.connects(&key), 1);
    assert_eq!(simulator.logins(&key), 1);
    assert_eq!(gateway.open_channels(), 1);
}

#[tokio::test]
async fn close_tears_down_channels() {
    let simulator = SimulatedConnector::new();
    let gateway = gateway(&simulator);
    let a = device("rig-1", 50051);
    let b = device("rig-2", 50052);
    gateway.execute(&a, &DeviceOperation::GetStatus).await.expect("a");
    gateway.execute(&b, &DeviceOperation::GetStatus).await.expect("b");
    assert_eq!(gateway.open_channels(), 2);

    assert!(gateway.close(&a.device_key()).await);
    assert!(!gateway.close(&a.device_key()).await);
    assert_eq!(gateway.open_channels(), 1);

    gateway.close_all().await;
    assert_eq!(gateway.open_channels(), 0);

    gateway.execute(&a, &DeviceOperation::GetStatus).await.expect("reconnect");
    assert_eq!(simulator.connects(&a.device_key()), 2);
}

#[tokio::test(start_paused = true)]
async fn short_lived_tokens_are_reused_within_their_lifetime() {
    let simulator = SimulatedConnector::new().with_token_timeout(30);
    let gateway = gateway(&simulator);
    let rig = device("rig-1", 50051);
    let key = rig.device_key();

    for _ in 0..3 {
        gateway
            .execute(&rig, &DeviceOperation::GetStatus)
            .await
            .expect("status");
    }
    assert_eq!(simulator.logins(&key), 1);

    tokio::time::advance(Duration::from_secs(15)).await;
    gateway
        .execute(&rig, &DeviceOperation::GetStatus)
        .await
        .expect("status after refresh");
    assert_eq!(simulator.logins(&key), 2);
    assert_eq!(simulator.calls(&key), 4);
}

#[tokio::test]
async fn forget_releases_per_device_state() {
    let simulator = SimulatedConnector::new();
    let gateway = gateway(&simulator);
    let a = device("rig-1", 50051);
    let b = device("rig-2", 50052);
    gateway.execute(&a, &DeviceOperation::GetStatus).await.expect("a");
    gateway.execute(&b, &DeviceOperation::GetStatus).await.expect("b");
    assert_eq!(gateway.tracked_devices(), 2);
    assert_eq!(gateway.sessions().tracked_devices(), 2);

    assert!(gateway.forget(&a.device_key()).await);
    assert!(!gateway.is_connected(&a.device_key()));
    assert!(gateway.sessions().session(&a.device_key()).is_none());
    assert_eq!(gateway.tracked_devices(), 1);
    assert_eq!(gateway.sessions().tracked_devices(), 1);
    assert!(gateway.is_connected(&b.device_key()));
}
