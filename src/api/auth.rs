use crate::api::models::ApiError;
use crate::error::AppError;
use crate::r#const::api::AUTHORIZATION_HEADER;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

// 常量时间比较授权码
fn auth_code_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// 授权码认证中间件
///
/// `Authorization` 头的值必须与配置的授权码完全一致。
pub async fn auth_middleware(
    State(auth_code): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|header| header.to_str().ok());

    match provided {
        Some(code) if auth_code_matches(code, &auth_code) => {
            Ok(next.run(request).await)
        }
        Some(_) => {
            warn!("Rejected API request to {}: invalid auth code", request.uri());
            Err(AppError::AuthRejected("invalid authorization code".to_string()).into())
        }
        None => {
            warn!("Rejected API request to {}: missing auth code", request.uri());
            Err(AppError::AuthRejected("authorization header is required".to_string()).into())
        }
    }
}
