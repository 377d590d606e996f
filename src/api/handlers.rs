use crate::api::models::{
    AddMappingRequest, ApiError, ApiResponse, DeleteMappingParams, DeleteResult, ErrorResponse,
    MappingList,
};
use crate::control::ControlPlane;
use crate::mapping::MappingView;
use crate::metrics::METRICS;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

// 记录请求结果
fn record<T>(endpoint: &str, result: &Result<ApiResponse<T>, ApiError>) {
    let code = match result {
        Ok(response) => response.code,
        Err(error) => error.code,
    };
    METRICS
        .api_requests_total()
        .with_label_values(&[endpoint, &code.to_string()])
        .inc();
}

/// 新增映射
#[utoipa::path(
    post,
    path = "/api/add",
    tag = "Mappings",
    request_body = AddMappingRequest,
    responses(
        (status = 201, description = "映射已生效", body = ApiResponse<MappingView>),
        (status = 400, description = "地址无效或请求格式错误", body = ErrorResponse),
        (status = 401, description = "认证失败", body = ErrorResponse),
        (status = 409, description = "端口冲突或绑定失败", body = ErrorResponse),
        (status = 504, description = "等待监听器启动超时", body = ErrorResponse)
    ),
    security(("auth_code" = []))
)]
pub async fn add_mapping(
    State(control): State<Arc<ControlPlane>>,
    payload: Result<Json<AddMappingRequest>, JsonRejection>,
) -> Result<ApiResponse<MappingView>, ApiError> {
    let result = add(&control, payload).await;
    record("add", &result);
    result
}

async fn add(
    control: &ControlPlane,
    payload: Result<Json<AddMappingRequest>, JsonRejection>,
) -> Result<ApiResponse<MappingView>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    debug!("API add request: {:?}", request);

    let view = control.add(request.into()).await?;
    info!(
        "API: mapping {} -> {} ({}) is active",
        view.listen_addr, view.forward_addr, view.mapping_type
    );
    Ok(ApiResponse::created(view, "Mapping added"))
}

/// 删除映射
#[utoipa::path(
    delete,
    path = "/api/delete",
    tag = "Mappings",
    params(DeleteMappingParams),
    responses(
        (status = 200, description = "映射已删除", body = ApiResponse<DeleteResult>),
        (status = 400, description = "地址无效", body = ErrorResponse),
        (status = 401, description = "认证失败", body = ErrorResponse),
        (status = 404, description = "映射不存在", body = ErrorResponse)
    ),
    security(("auth_code" = []))
)]
pub async fn delete_mapping(
    State(control): State<Arc<ControlPlane>>,
    params: Result<Query<DeleteMappingParams>, QueryRejection>,
) -> Result<ApiResponse<DeleteResult>, ApiError> {
    let result = delete(&control, params).await;
    record("delete", &result);
    result
}

async fn delete(
    control: &ControlPlane,
    params: Result<Query<DeleteMappingParams>, QueryRejection>,
) -> Result<ApiResponse<DeleteResult>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    debug!("API delete request: {:?}", params);

    let removed = control
        .delete(&params.listen_addr, params.mapping_type)
        .await?;
    info!("API: mapping {} deleted", params.listen_addr);
    Ok(ApiResponse::success_with_data(
        DeleteResult {
            listen_addr: params.listen_addr,
            removed,
        },
        "Mapping deleted",
    ))
}

/// 查询所有映射（按添加顺序）
#[utoipa::path(
    get,
    path = "/api/query",
    tag = "Mappings",
    responses(
        (status = 200, description = "映射列表", body = ApiResponse<Vec<MappingView>>),
        (status = 401, description = "认证失败", body = ErrorResponse)
    ),
    security(("auth_code" = []))
)]
pub async fn query_mappings(
    State(control): State<Arc<ControlPlane>>,
) -> Result<ApiResponse<MappingList>, ApiError> {
    let mappings = control.query();
    let message = format!("{} mapping(s)", mappings.len());
    let result = Ok(ApiResponse::success_with_data(mappings, message));
    record("query", &result);
    result
}
