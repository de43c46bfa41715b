//! 行分隔 JSON RPC 的 TCP 传输。
//!
//! 每个设备一条 TCP 连接，每行一个 JSON 报文：
//!
//! - 请求：`{"id","method","params","token"}`
//! - 响应：`{"id","result"}` 或 `{"id","error":{"code","message"}}`
//!
//! 同一连接同一时刻只有一个请求在途（异步互斥保护）。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let connector = TcpJsonConnector::new(TcpJsonConfig::default());
//! let channel = connector.connect(&device).await?;
//! let grant = channel.login(&device.credentials).await?;
//! ```

use crate::transport::{DeviceChannel, DeviceConnector};
use async_trait::async_trait;
use domain::{DeviceCredentials, DeviceError, DeviceOperation, DeviceRegistration};
use fleet_session::LoginGrant;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::debug;

/// TCP JSON 传输配置
#[derive(Debug, Clone)]
pub struct TcpJsonConfig {
    /// 建立连接超时
    pub connect_timeout: Duration,
}

impl Default for TcpJsonConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
        }
    }
}

pub struct TcpJsonConnector {
    config: TcpJsonConfig,
}

impl TcpJsonConnector {
    pub fn new(config: TcpJsonConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DeviceConnector for TcpJsonConnector {
    async fn connect(
        &self,
        device: &DeviceRegistration,
    ) -> Result<Arc<dyn DeviceChannel>, DeviceError> {
        let key = device.device_key();
        let stream = match tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((device.host.as_str(), device.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(DeviceError::connection(&key, err.to_string())),
            Err(_) => {
                return Err(DeviceError::connection(
                    &key,
                    format!(
                        "connect timed out after {}ms",
                        self.config.connect_timeout.as_millis()
                    ),
                ));
            }
        };
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        debug!(target: "fleet.gateway", device = %key, "tcp_json_connected");
        Ok(Arc::new(TcpJsonChannel {
            key,
            io: Mutex::new(Some(ChannelIo {
                reader: BufReader::new(reader),
                writer,
            })),
        }))
    }
}

struct ChannelIo {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

struct TcpJsonChannel {
    key: String,
    io: Mutex<Option<ChannelIo>>,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    id: String,
    method: &'a str,
    params: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: String,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    token: String,
    timeout_s: u64,
}

impl TcpJsonChannel {
    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
        token: Option<&str>,
    ) -> Result<serde_json::Value, DeviceError> {
        let request = RpcRequest {
            id: uuid::Uuid::new_v4().to_string(),
            method,
            params,
            token,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|err| DeviceError::Internal(err.to_string()))?;
        line.push('\n');

        let mut guard = self.io.lock().await;
        let io = match &mut *guard {
            Some(io) => io,
            None => return Err(DeviceError::connection(&self.key, "channel closed")),
        };

        io.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|err| DeviceError::connection(&self.key, err.to_string()))?;
        io.writer
            .flush()
            .await
            .map_err(|err| DeviceError::connection(&self.key, err.to_string()))?;
        debug!(target: "fleet.gateway", device = %self.key, method, id = %request.id, "tcp_json_request_sent");

        let mut response = String::new();
        let read = io
            .reader
            .read_line(&mut response)
            .await
            .map_err(|err| DeviceError::connection(&self.key, err.to_string()))?;
        if read == 0 {
            return Err(DeviceError::connection(&self.key, "connection closed"));
        }

        let response: RpcResponse = serde_json::from_str(response.trim())
            .map_err(|err| DeviceError::Internal(format!("malformed device response: {err}")))?;
        if response.id != request.id {
            // 响应与请求错位，连接已不可用。
            return Err(DeviceError::connection(
                &self.key,
                format!("response id mismatch: expected {}, got {}", request.id, response.id),
            ));
        }
        if let Some(error) = response.error {
            return Err(classify_rpc_error(&self.key, &error.code, &error.message));
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl DeviceChannel for TcpJsonChannel {
    async fn login(&self, credentials: &DeviceCredentials) -> Result<LoginGrant, DeviceError> {
        let params = serde_json::json!({
            "username": credentials.username,
            "password": credentials.password,
        });
        let result = self.request("login", params, None).await?;
        let login: LoginResult = serde_json::from_value(result)
            .map_err(|err| DeviceError::Internal(format!("malformed login result: {err}")))?;
        Ok(LoginGrant {
            token: login.token,
            timeout_s: login.timeout_s,
        })
    }

    async fn call(
        &self,
        token: &str,
        operation: &DeviceOperation,
    ) -> Result<serde_json::Value, DeviceError> {
        self.request(operation.method(), operation.params(), Some(token))
            .await
    }

    async fn close(&self) {
        if let Some(mut io) = self.io.lock().await.take() {
            let _ = io.writer.shutdown().await;
        }
    }
}

/// 设备错误码映射。
fn classify_rpc_error(device: &str, code: &str, message: &str) -> DeviceError {
    match code {
        "invalid_argument" | "out_of_range" => DeviceError::Validation(message.to_string()),
        "unauthenticated" | "permission_denied" => DeviceError::Authentication {
            device: device.to_string(),
            reason: message.to_string(),
        },
        "unavailable" => DeviceError::Offline {
            device: device.to_string(),
            reason: message.to_string(),
        },
        "busy" | "resource_exhausted" => DeviceError::Busy {
            device: device.to_string(),
            reason: message.to_string(),
        },
        "not_found" => DeviceError::NotFound(message.to_string()),
        other => DeviceError::Internal(format!("{other}: {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_codes_map_to_taxonomy() {
        let device = "10.0.0.1:50051";
        assert!(matches!(
            classify_rpc_error(device, "invalid_argument", "watts"),
            DeviceError::Validation(_)
        ));
        assert!(classify_rpc_error(device, "unauthenticated", "expired").is_authentication());
        assert!(matches!(
            classify_rpc_error(device, "unavailable", "rebooting"),
            DeviceError::Offline { .. }
        ));
        assert!(matches!(
            classify_rpc_error(device, "busy", "updating"),
            DeviceError::Busy { .. }
        ));
        assert!(!classify_rpc_error(device, "weird", "x").is_retryable());
    }

    #[test]
    fn request_omits_missing_token() {
        let request = RpcRequest {
            id: "1".to_string(),
            method: "login",
            params: serde_json::json!({}),
            token: None,
        };
        let text = serde_json::to_string(&request).unwrap_or_default();
        assert!(!text.contains("token"));
    }
}
