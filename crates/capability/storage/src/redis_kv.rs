//! Redis 键值存储实现

use crate::error::StorageError;
use crate::traits::KvStore;
use redis::AsyncCommands;
use std::time::Duration;

/// Redis 键值存储。
///
/// 所有键统一加前缀，避免与同库其他应用冲突；TTL 以毫秒精度写入（PSETEX）。
pub struct RedisKvStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisKvStore {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn connect(redis_url: &str, key_prefix: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client, key_prefix))
    }

    fn full_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix.trim_end_matches(':'), key)
        }
    }
}

#[async_trait::async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let data: Option<String> = connection.get(self.full_key(key)).await?;
        Ok(data)
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let key = self.full_key(key);
        match ttl {
            Some(ttl) => {
                let ttl_ms = (ttl.as_millis() as u64).max(1);
                redis::cmd("PSETEX")
                    .arg(&key)
                    .arg(ttl_ms)
                    .arg(value)
                    .query_async::<_, ()>(&mut connection)
                    .await?;
            }
            None => {
                connection.set::<_, _, ()>(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let removed: i64 = connection.del(self.full_key(key)).await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_prefixed() {
        let store = RedisKvStore::connect("redis://127.0.0.1:6379", "fleet:").expect("client");
        assert_eq!(store.full_key("job:1"), "fleet:job:1");
        let bare = RedisKvStore::connect("redis://127.0.0.1:6379", "").expect("client");
        assert_eq!(bare.full_key("job:1"), "job:1");
    }
}
