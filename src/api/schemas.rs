use crate::api::handlers;
use crate::api::models::{AddMappingRequest, ApiResponse, DeleteResult, ErrorDetail, ErrorResponse};
use crate::mapping::{ListenerState, ListenerView, MappingType, MappingView, Transport};
use crate::r#const::api::{AUTHORIZATION_HEADER, DOCS_PATH};
use axum::Router;
use tracing::debug;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_scalar::{Scalar, Servable};

/// OpenAPI 文档结构
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::add_mapping,
        handlers::delete_mapping,
        handlers::query_mappings,
    ),
    components(
        schemas(
            // 响应模型
            ApiResponse<MappingView>,
            ApiResponse<Vec<MappingView>>,
            ApiResponse<DeleteResult>,
            ErrorResponse,
            ErrorDetail,
            // 请求与数据模型
            AddMappingRequest,
            DeleteResult,
            MappingView,
            ListenerView,
            MappingType,
            ListenerState,
            Transport,
        ),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Mappings", description = "端口映射 APIs | Port Mapping APIs"),
    ),
    info(
        title = "PortRelay APIs",
        version = "v1",
        description = "PortRelay 是一个 TCP/UDP 端口转发守护进程。此管理 API 用于动态添加、删除和查询端口映射规则，所有请求都需要在 Authorization 头中携带授权码。
        <br><br>
        PortRelay is a TCP/UDP port relay daemon. This admin API adds, deletes and queries port mapping rules at runtime. Every request must carry the auth code in the Authorization header.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        ),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "auth_code",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(AUTHORIZATION_HEADER))),
            );
        }
    }
}

pub fn openapi_routes() -> Router {
    debug!(
        "OpenAPI UI is enabled in debug mode, visit \"{}\"",
        DOCS_PATH
    );
    Router::new().merge(Scalar::with_url(DOCS_PATH, ApiDoc::openapi()))
}
