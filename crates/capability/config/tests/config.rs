use fleet_config::{AppConfig, ConfigError};

// 环境变量为进程级共享状态，所有断言放在同一个测试内顺序执行。
#[test]
fn load_config_from_env() {
    // Rust 2024 中 set_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        std::env::set_var("FLEET_HTTP_ADDR", "127.0.0.1:8081");
        std::env::set_var("FLEET_STATUS_TTL_SECONDS", "15");
        std::env::set_var("FLEET_RETRY_MULTIPLIER", "1.5");
        std::env::remove_var("FLEET_REDIS_URL");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8081");
    assert_eq!(config.status_ttl_seconds, 15);
    assert_eq!(config.summary_ttl_seconds, 60);
    assert_eq!(config.retry_max_attempts, 3);
    assert_eq!(config.retry_multiplier, 1.5);
    assert!(config.redis_url.is_none());

    unsafe {
        std::env::set_var("FLEET_RETRY_MAX_ATTEMPTS", "0");
    }
    let err = AppConfig::from_env().expect_err("zero attempts");
    assert!(matches!(err, ConfigError::Invalid(key, _) if key == "FLEET_RETRY_MAX_ATTEMPTS"));

    unsafe {
        std::env::set_var("FLEET_RETRY_MAX_ATTEMPTS", "three");
    }
    assert!(AppConfig::from_env().is_err());
    unsafe {
        std::env::remove_var("FLEET_RETRY_MAX_ATTEMPTS");
    }
}
