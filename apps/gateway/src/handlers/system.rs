//! 系统侧 handlers
//!
//! - GET /api/health：健康检查（无鉴权）
//! - GET /livez：存活探针
//! - GET /api/info：静态标识
//! - GET /api/metrics：指标快照（Bearer）

use crate::middleware::require_bearer;
use crate::AppState;
use api_contract::{ApiResponse, HealthDto, InfoDto, MetricsSnapshotDto};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::Protocol;
use tgw_telemetry::metrics;

/// 健康检查（裸 JSON，不走 ApiResponse 封装）
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthDto {
            status: "ok".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: state.started_at.elapsed().as_secs(),
        }),
    )
}

/// 存活探针
pub async fn livez() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

/// 静态标识（裸 JSON）
pub async fn info(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(InfoDto {
            name: "tgw-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            protocols: vec![
                Protocol::Gt06.as_str().to_string(),
                Protocol::Teltonika.as_str().to_string(),
            ],
            environment: state.environment.clone(),
        }),
    )
}

/// 指标快照
pub async fn get_metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = require_bearer(&state, &headers) {
        return response;
    }
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            connections_opened: snapshot.connections_opened,
            connections_closed: snapshot.connections_closed,
            connections_refused: snapshot.connections_refused,
            frames_decoded: snapshot.frames_decoded,
            framing_invalid: snapshot.framing_invalid,
            checksum_mismatch: snapshot.checksum_mismatch,
            decode_errors: snapshot.decode_errors,
            unauthorised: snapshot.unauthorised,
            packets_acked: snapshot.packets_acked,
            records_forwarded: snapshot.records_forwarded,
            forward_failure: snapshot.forward_failure,
            presence_updates: snapshot.presence_updates,
            presence_update_failure: snapshot.presence_update_failure,
            commands_dispatched: snapshot.commands_dispatched,
            command_dispatch_failure: snapshot.command_dispatch_failure,
            sync_runs: snapshot.sync_runs,
        })),
    )
        .into_response()
}
