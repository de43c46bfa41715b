//! # 设备会话能力
//!
//! 按设备（`host:port`）缓存登录换取的 token，临近过期时重新登录。
//!
//! ## 规则
//!
//! - 仅当 `now < expires_at - margin` 时复用缓存 token；过期会话直接丢弃
//! - `margin = min(safety_margin, timeout / 2)`：有效期短于配置余量的 token 仍可在前半段复用
//! - 同一设备在无有效 token 时的并发请求只触发一次登录（单飞），其余请求等待并复用结果
//! - 登录被设备拒绝时返回不可重试的 `DeviceError::Authentication`；
//!   连接类失败（可重试）原样返回，由网关按退避策略重试
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let sessions = SessionManager::new(SessionConfig::default());
//! let token = sessions
//!     .get_token(&device.device_key(), || async { channel.login(&device.credentials).await })
//!     .await?;
//! ```

use domain::{DeviceError, now_epoch_ms};
use fleet_telemetry::{record_login, record_login_failure};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// 会话管理配置。
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// token 过期前的安全余量
    pub safety_margin: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(60),
        }
    }
}

/// 设备登录结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub token: String,
    /// token 有效期（秒）
    pub timeout_s: u64,
}

/// 一个设备的已认证会话。
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub device_key: String,
    pub token: String,
    pub issued_at: Instant,
    pub issued_at_ms: i64,
    pub expires_at: Instant,
    pub timeout: Duration,
    /// `expires_at - margin`，此后不再交出该 token
    pub refresh_at: Instant,
}

impl DeviceSession {
    pub fn is_usable_at(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

/// 实际使用的安全余量，不超过 token 有效期的一半。
pub fn effective_margin(safety_margin: Duration, timeout: Duration) -> Duration {
    safety_margin.min(timeout / 2)
}

/// 会话管理器。
///
/// 读多写少：已有会话的读取只持有读锁；登录按设备串行化。
pub struct SessionManager {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, DeviceSession>>,
    login_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            login_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 获取可用 token；必要时执行 `login` 完成登录交换。
    pub async fn get_token<F, Fut>(&self, device_key: &str, login: F) -> Result<String, DeviceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<LoginGrant, DeviceError>>,
    {
        if let Some(token) = self.cached_token(device_key) {
            return Ok(token);
        }

        let lock = self.login_lock(device_key)?;
        let _guard = lock.lock().await;

        // 等锁期间其他请求可能已完成登录。
        if let Some(token) = self.cached_token(device_key) {
            return Ok(token);
        }

        let grant = match login().await {
            Ok(grant) => grant,
            Err(err) => {
                record_login_failure();
                warn!(
                    target: "fleet.session",
                    device = %device_key,
                    error = %err,
                    "device_login_failed"
                );
                return Err(classify_login_error(device_key, err));
            }
        };
        record_login();

        let now = Instant::now();
        let timeout = Duration::from_secs(grant.timeout_s);
        let margin = effective_margin(self.config.safety_margin, timeout);
        if margin < self.config.safety_margin {
            warn!(
                target: "fleet.session",
                device = %device_key,
                timeout_s = grant.timeout_s,
                margin_ms = margin.as_millis() as u64,
                "device_token_margin_reduced"
            );
        }
        let session = DeviceSession {
            device_key: device_key.to_string(),
            token: grant.token.clone(),
            issued_at: now,
            issued_at_ms: now_epoch_ms(),
            expires_at: now + timeout,
            timeout,
            refresh_at: now + timeout - margin,
        };
        self.sessions
            .write()
            .map_err(|_| DeviceError::Internal("session lock failed".to_string()))?
            .insert(device_key.to_string(), session);
        info!(
            target: "fleet.session",
            device = %device_key,
            timeout_s = grant.timeout_s,
            "device_session_established"
        );
        Ok(grant.token)
    }

    /// 丢弃设备的缓存 token（例如认证失败后）。
    pub fn invalidate(&self, device_key: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .map(|mut map| map.remove(device_key).is_some())
            .unwrap_or(false);
        if removed {
            info!(target: "fleet.session", device = %device_key, "device_session_invalidated");
        }
        removed
    }

    /// 设备注销：丢弃会话及其登录锁。
    pub fn forget(&self, device_key: &str) {
        self.invalidate(device_key);
        if let Ok(mut locks) = self.login_locks.lock() {
            locks.remove(device_key);
        }
    }

    /// 当前持有登录锁的设备数。
    pub fn tracked_devices(&self) -> usize {
        self.login_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    /// 当前缓存的会话（不论是否仍可用）。
    pub fn session(&self, device_key: &str) -> Option<DeviceSession> {
        self.sessions
            .read()
            .ok()
            .and_then(|map| map.get(device_key).cloned())
    }

    fn cached_token(&self, device_key: &str) -> Option<String> {
        let now = Instant::now();
        let expired = {
            let map = self.sessions.read().ok()?;
            match map.get(device_key) {
                Some(session) if session.is_usable_at(now) => {
                    return Some(session.token.clone());
                }
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            if let Ok(mut map) = self.sessions.write() {
                let still_expired = map
                    .get(device_key)
                    .is_some_and(|session| !session.is_usable_at(now));
                if still_expired {
                    map.remove(device_key);
                }
            }
        }
        None
    }

    fn login_lock(&self, device_key: &str) -> Result<Arc<tokio::sync::Mutex<()>>, DeviceError> {
        let mut locks = self
            .login_locks
            .lock()
            .map_err(|_| DeviceError::Internal("session lock failed".to_string()))?;
        Ok(locks
            .entry(device_key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }
}

fn classify_login_error(device_key: &str, err: DeviceError) -> DeviceError {
    match err {
        err if err.is_retryable() || err.is_authentication() => err,
        other => DeviceError::Authentication {
            device: device_key.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_login_becomes_authentication_error() {
        let err = classify_login_error("10.0.0.1:50051", DeviceError::Internal("denied".into()));
        assert!(matches!(err, DeviceError::Authentication { ref device, .. } if device == "10.0.0.1:50051"));
        let err = classify_login_error("d", DeviceError::connection("d", "refused"));
        assert!(err.is_retryable());
    }

    #[test]
    fn margin_is_capped_at_half_the_token_lifetime() {
        let margin = Duration::from_secs(60);
        assert_eq!(effective_margin(margin, Duration::from_secs(600)), margin);
        assert_eq!(
            effective_margin(margin, Duration::from_secs(30)),
            Duration::from_secs(15)
        );
        assert_eq!(effective_margin(margin, Duration::ZERO), Duration::ZERO);
    }
}
