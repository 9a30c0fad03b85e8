//! HTTP 响应辅助函数
//!
//! 所有错误返回统一的 ApiResponse 格式，HTTP 状态码与错误码对应。

use api_contract::{error_codes, ApiResponse};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tgw_storage::StorageError;

/// 认证错误响应
pub fn auth_error() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::<()>::error(
            error_codes::AUTH_UNAUTHORIZED,
            "unauthorized",
        )),
    )
        .into_response()
}

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::<()>::error(
            error_codes::INVALID_REQUEST,
            message.into(),
        )),
    )
        .into_response()
}

/// 存储错误响应（SQL/Redis 不可用时命令不入队，由运维侧重试）
pub fn storage_error(err: StorageError) -> Response {
    tracing::error!(target: "tgw.api", error = %err, "storage error");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiResponse::<()>::error(
            error_codes::STORAGE_UNAVAILABLE,
            err.to_string(),
        )),
    )
        .into_response()
}
