//! 指标快照。
//!
//! - GET /metrics

use api_contract::{ApiResponse, MetricsSnapshotDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fleet_telemetry::metrics;

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            remote_calls: snapshot.remote_calls,
            remote_call_failures: snapshot.remote_call_failures,
            remote_retries: snapshot.remote_retries,
            remote_latency_ms_total: snapshot.remote_latency_ms_total,
            remote_latency_ms_count: snapshot.remote_latency_ms_count,
            logins: snapshot.logins,
            login_failures: snapshot.login_failures,
            connections_opened: snapshot.connections_opened,
            status_cache_hits: snapshot.status_cache_hits,
            status_cache_misses: snapshot.status_cache_misses,
            jobs_created: snapshot.jobs_created,
            jobs_completed: snapshot.jobs_completed,
            jobs_failed: snapshot.jobs_failed,
        })),
    )
        .into_response()
}
