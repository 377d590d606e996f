use crate::error::AppError;
use crate::mapping::{MappingType, MappingView, NewMapping};
use crate::r#const::api::{error_types, response_status};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// API 统一响应结构
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// HTTP 状态码
    pub code: u16,
    /// 响应状态 ("success" 或 "error")
    pub status: String,
    /// 人类可读的消息
    pub message: String,
    /// 响应数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// 错误详情 (仅在错误时存在)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// 错误响应
pub type ApiError = ApiResponse<()>;

/// 错误详情结构
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// 错误类型
    pub r#type: String,
    /// 错误消息
    pub message: String,
}

/// 错误响应结构（用于文档）
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP 状态码
    pub code: u16,
    /// 响应状态 (始终为 "error")
    pub status: String,
    /// 人类可读的消息
    pub message: String,
    /// 错误详情
    pub error: ErrorDetail,
}

impl<T> ApiResponse<T> {
    /// 创建一个成功响应，带数据
    pub fn success_with_data(data: T, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, data, message)
    }

    /// 创建一个 201 响应
    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CREATED, data, message)
    }

    fn with_status(status_code: StatusCode, data: T, message: impl Into<String>) -> Self {
        Self {
            code: status_code.as_u16(),
            status: response_status::SUCCESS.to_string(),
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    /// 创建一个错误响应
    pub fn error(
        status_code: StatusCode,
        error_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            code: status_code.as_u16(),
            status: response_status::ERROR.to_string(),
            message: message.clone(),
            data: None,
            error: Some(ErrorDetail {
                r#type: error_type.into(),
                message,
            }),
        }
    }

    /// 请求格式错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(StatusCode::BAD_REQUEST, error_types::BAD_REQUEST, message)
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let status_code =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status_code, Json(self)).into_response()
    }
}

/// 错误类型到 HTTP 状态码的映射
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
        AppError::AuthRejected(_) => StatusCode::UNAUTHORIZED,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::PortConflict(_) | AppError::BindFailure { .. } => StatusCode::CONFLICT,
        AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        ApiResponse::error(status_for(&error), error.error_type(), error.to_string())
    }
}

/// 新增映射请求
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddMappingRequest {
    /// 监听地址，如 ":80" 或 "127.0.0.1:8080"
    #[schema(example = ":80")]
    pub listen_addr: String,
    /// 转发目标，如 "192.168.8.1:80"
    #[schema(example = "192.168.8.1:80")]
    pub forward_addr: String,
    /// 映射类型
    pub mapping_type: MappingType,
    /// 临时规则不写入状态文件
    #[serde(default)]
    pub temp: bool,
}

impl From<AddMappingRequest> for NewMapping {
    fn from(request: AddMappingRequest) -> Self {
        NewMapping::new(
            request.listen_addr,
            request.forward_addr,
            request.mapping_type,
        )
        .temporary(request.temp)
    }
}

/// 删除映射的查询参数
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DeleteMappingParams {
    /// 监听地址
    pub listen_addr: String,
    /// 映射类型，缺省时删除该地址上的所有协议
    pub mapping_type: Option<MappingType>,
}

/// 删除结果
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub listen_addr: String,
    /// 被停止的监听器，如 "tcp/0.0.0.0:80"
    pub removed: Vec<String>,
}

/// 查询结果
pub type MappingList = Vec<MappingView>;
