use crate::api::auth::auth_middleware;
use crate::api::handlers;
use crate::control::ControlPlane;
use crate::r#const::api::{ADD_PATH, DELETE_PATH, QUERY_PATH};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

/// 创建映射管理 API 路由，所有路由都需要授权码
pub fn api_routes(control: Arc<ControlPlane>, auth_code: &str) -> Router {
    let auth_code: Arc<str> = Arc::from(auth_code);

    Router::new()
        .route(ADD_PATH, post(handlers::add_mapping))
        .route(DELETE_PATH, delete(handlers::delete_mapping))
        .route(QUERY_PATH, get(handlers::query_mappings))
        .route_layer(middleware::from_fn_with_state(auth_code, auth_middleware))
        .with_state(control)
}
