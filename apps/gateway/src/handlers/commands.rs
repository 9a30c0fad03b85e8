//! 下行命令 handlers
//!
//! - POST /api/commands/:imei

use crate::middleware::require_bearer;
use crate::utils::response::{bad_request_error, storage_error};
use crate::AppState;
use api_contract::{CommandAcceptedDto, CreateCommandRequest};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

/// 下发命令：先持久化（SQL + Redis 镜像），再提醒活跃会话即时派发。
///
/// 无论设备是否在线都会入队，设备下一个报文会触发投递。
pub async fn create_command(
    State(state): State<AppState>,
    Path(imei): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateCommandRequest>,
) -> Response {
    if let Err(response) = require_bearer(&state, &headers) {
        return response;
    }
    let command = req.command.trim();
    if command.is_empty() {
        return bad_request_error("command must not be empty");
    }
    if imei.trim().is_empty() || !imei.bytes().all(|b| b.is_ascii_digit()) {
        return bad_request_error("imei must be decimal digits");
    }

    match state.commands.enqueue(&imei, command).await {
        Ok(entry) => {
            let live = state.registry.nudge(&imei).await;
            info!(
                target: "tgw.api",
                imei = %imei,
                command_id = entry.id,
                live,
                "command queued"
            );
            let message = if live {
                "command queued and dispatched to live session"
            } else {
                "command queued for next device packet"
            };
            (
                StatusCode::OK,
                Json(CommandAcceptedDto {
                    message: message.to_string(),
                    command_id: entry.id,
                }),
            )
                .into_response()
        }
        Err(err) => storage_error(err),
    }
}
