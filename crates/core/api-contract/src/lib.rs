//! 管理面 API 的稳定 DTO 与响应契约。

use serde::{Deserialize, Serialize};

/// 稳定错误码清单（跨运维工具对齐）。
pub mod error_codes {
    pub const AUTH_UNAUTHORIZED: &str = "AUTH.UNAUTHORIZED";
    pub const INVALID_REQUEST: &str = "INVALID.REQUEST";
    pub const STORAGE_UNAVAILABLE: &str = "STORAGE.UNAVAILABLE";
    pub const INTERNAL_ERROR: &str = "INTERNAL.ERROR";
}

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查响应体。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub status: String,
    pub timestamp: String,
    pub uptime_seconds: u64,
}

/// 静态标识响应体。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoDto {
    pub name: String,
    pub version: String,
    pub protocols: Vec<String>,
    pub environment: String,
}

/// 命令下发请求体。
#[derive(Debug, Deserialize)]
pub struct CreateCommandRequest {
    pub command: String,
}

/// 命令下发响应体。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAcceptedDto {
    pub message: String,
    pub command_id: i64,
}

/// 网关指标快照响应体。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub connections_refused: u64,
    pub frames_decoded: u64,
    pub framing_invalid: u64,
    pub checksum_mismatch: u64,
    pub decode_errors: u64,
    pub unauthorised: u64,
    pub packets_acked: u64,
    pub records_forwarded: u64,
    pub forward_failure: u64,
    pub presence_updates: u64,
    pub presence_update_failure: u64,
    pub commands_dispatched: u64,
    pub command_dispatch_failure: u64,
    pub sync_runs: u64,
}
