//! 任务记录存储。

use crate::error::JobError;
use domain::JobRecord;
use fleet_storage::KvStore;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct JobStore {
    kv: Arc<dyn KvStore>,
    ttl: Option<Duration>,
}

impl JobStore {
    /// `ttl` 为任务记录的保留时长；每次写入都会重置。
    pub fn new(kv: Arc<dyn KvStore>, ttl: Option<Duration>) -> Self {
        Self { kv, ttl }
    }

    pub async fn load(&self, job_id: &str) -> Result<Option<JobRecord>, JobError> {
        let Some(raw) = self.kv.get(&job_key(job_id)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| JobError::Encoding(err.to_string()))
    }

    pub async fn save(&self, record: &JobRecord) -> Result<(), JobError> {
        let raw =
            serde_json::to_string(record).map_err(|err| JobError::Encoding(err.to_string()))?;
        self.kv.put(&job_key(&record.job_id), raw, self.ttl).await?;
        Ok(())
    }
}

fn job_key(job_id: &str) -> String {
    format!("job:{job_id}")
}
