//! 路由定义
//!
//! 集中管理管理面 API 路由：
//! - 健康检查：/api/health（无鉴权）
//! - 静态标识：/api/info（无鉴权）
//! - 存活探针：/livez
//! - 指标快照：/api/metrics（Bearer）
//! - 命令下发：/api/commands/:imei（Bearer）

use super::handlers::*;
use super::AppState;
use axum::{
    routing::{get, post},
    Router,
};

/// 创建 API 路由，/ 与 /api/ 两种前缀都接受。
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(health))
        .route("/livez", get(livez))
        .route("/info", get(info))
        .route("/api/info", get(info))
        .route("/metrics", get(get_metrics))
        .route("/api/metrics", get(get_metrics))
        .route("/commands/:imei", post(create_command))
        .route("/api/commands/:imei", post(create_command))
}
