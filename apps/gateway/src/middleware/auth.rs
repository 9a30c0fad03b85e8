//! 请求上下文与静态 Bearer 鉴权
//!
//! - request_context：注入 request_id/trace_id 并回写响应头
//! - bearer_token：从 Authorization 头提取 Bearer token
//! - require_bearer：与配置的 SECRET_KEY 比对，不符返回 401

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use tgw_telemetry::new_request_ids;
use tracing::Instrument;

use crate::utils::response::auth_error;
use crate::AppState;

/// 请求上下文中间件：注入 request_id/trace_id
pub async fn request_context(mut req: Request<Body>, next: Next) -> Response {
    let ids = new_request_ids();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(ids.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %ids.request_id,
        trace_id = %ids.trace_id,
        method = %method,
        path = %path
    );

    let mut response = next.run(req).instrument(span).await;
    response.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&ids.request_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response.headers_mut().insert(
        "x-trace-id",
        HeaderValue::from_str(&ids.trace_id).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    response
}

/// 从请求头中提取 Bearer token
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header_value = headers.get(header::AUTHORIZATION)?;
    let auth_str = header_value.to_str().ok()?;
    auth_str.strip_prefix("Bearer ")
}

/// 校验静态 Bearer token
pub fn require_bearer(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    match bearer_token(headers) {
        Some(token) if token == state.secret_key => Ok(()),
        _ => Err(auth_error()),
    }
}

#[cfg(test)]
mod tests {
    use super::bearer_token;
    use axum::http::{header, HeaderMap, HeaderValue};

    #[test]
    fn bearer_token_extracts() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer token-1"),
        );
        assert_eq!(bearer_token(&headers), Some("token-1"));
    }

    #[test]
    fn missing_header_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
    }
}
