//! 设备注册信息与过滤条件。

use serde::{Deserialize, Serialize};

/// 设备登录凭据。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentials {
    pub username: String,
    pub password: String,
}

impl DeviceCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for DeviceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 已注册设备。
///
/// `device_id` 是调用方使用的逻辑标识；会话与连接按 `host:port`（device key）复用，
/// 两个逻辑设备指向同一端点时共享同一条连接与同一个 token。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub credentials: DeviceCredentials,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DeviceRegistration {
    /// 会话与连接的复用键。
    pub fn device_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 判断设备是否满足过滤条件。
    pub fn matches(&self, filter: &DeviceFilter) -> bool {
        if let Some(ids) = &filter.device_ids {
            if !ids.iter().any(|id| id == &self.device_id) {
                return false;
            }
        }
        filter
            .tags
            .iter()
            .all(|tag| self.tags.iter().any(|own| own == tag))
    }
}

/// 集群查询过滤条件：标签需全部命中；`device_ids` 为空表示不限制。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub device_ids: Option<Vec<String>>,
}

impl DeviceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_tags(tags: Vec<String>) -> Self {
        Self {
            tags,
            device_ids: None,
        }
    }

    /// 与字段顺序无关的稳定键，用于集群汇总缓存。
    pub fn cache_key(&self) -> String {
        let mut tags = self.tags.clone();
        tags.sort();
        tags.dedup();
        let ids = match &self.device_ids {
            Some(ids) => {
                let mut ids = ids.clone();
                ids.sort();
                ids.dedup();
                ids.join(",")
            }
            None => "*".to_string(),
        };
        format!("tags={};ids={}", tags.join(","), ids)
    }
}
