//! 追踪、请求 ID 与基础指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub remote_calls: u64,
    pub remote_call_failures: u64,
    pub remote_retries: u64,
    pub remote_latency_ms_total: u64,
    pub remote_latency_ms_count: u64,
    pub logins: u64,
    pub login_failures: u64,
    pub connections_opened: u64,
    pub status_cache_hits: u64,
    pub status_cache_misses: u64,
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

/// 基础指标。
pub struct TelemetryMetrics {
    remote_calls: AtomicU64,
    remote_call_failures: AtomicU64,
    remote_retries: AtomicU64,
    remote_latency_ms_total: AtomicU64,
    remote_latency_ms_count: AtomicU64,
    logins: AtomicU64,
    login_failures: AtomicU64,
    connections_opened: AtomicU64,
    status_cache_hits: AtomicU64,
    status_cache_misses: AtomicU64,
    jobs_created: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            remote_calls: AtomicU64::new(0),
            remote_call_failures: AtomicU64::new(0),
            remote_retries: AtomicU64::new(0),
            remote_latency_ms_total: AtomicU64::new(0),
            remote_latency_ms_count: AtomicU64::new(0),
            logins: AtomicU64::new(0),
            login_failures: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            status_cache_hits: AtomicU64::new(0),
            status_cache_misses: AtomicU64::new(0),
            jobs_created: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            remote_call_failures: self.remote_call_failures.load(Ordering::Relaxed),
            remote_retries: self.remote_retries.load(Ordering::Relaxed),
            remote_latency_ms_total: self.remote_latency_ms_total.load(Ordering::Relaxed),
            remote_latency_ms_count: self.remote_latency_ms_count.load(Ordering::Relaxed),
            logins: self.logins.load(Ordering::Relaxed),
            login_failures: self.login_failures.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            status_cache_hits: self.status_cache_hits.load(Ordering::Relaxed),
            status_cache_misses: self.status_cache_misses.load(Ordering::Relaxed),
            jobs_created: self.jobs_created.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录远程调用完成（含延迟，毫秒）。
pub fn record_remote_call(latency_ms: u64) {
    let metrics = metrics();
    metrics.remote_calls.fetch_add(1, Ordering::Relaxed);
    metrics
        .remote_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .remote_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录远程调用最终失败次数（重试耗尽或不可重试）。
pub fn record_remote_call_failure() {
    metrics()
        .remote_call_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录重试次数。
pub fn record_remote_retry() {
    metrics().remote_retries.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备登录次数。
pub fn record_login() {
    metrics().logins.fetch_add(1, Ordering::Relaxed);
}

/// 记录设备登录失败次数。
pub fn record_login_failure() {
    metrics().login_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录新建连接次数。
pub fn record_connection_opened() {
    metrics().connections_opened.fetch_add(1, Ordering::Relaxed);
}

/// 记录状态缓存命中。
pub fn record_status_cache_hit() {
    metrics().status_cache_hits.fetch_add(1, Ordering::Relaxed);
}

/// 记录状态缓存未命中（含强制刷新）。
pub fn record_status_cache_miss() {
    metrics().status_cache_misses.fetch_add(1, Ordering::Relaxed);
}

pub fn record_job_created() {
    metrics().jobs_created.fetch_add(1, Ordering::Relaxed);
}

pub fn record_job_completed() {
    metrics().jobs_completed.fetch_add(1, Ordering::Relaxed);
}

pub fn record_job_failed() {
    metrics().jobs_failed.fetch_add(1, Ordering::Relaxed);
}
