use crate::api::{api_routes, openapi_routes};
use crate::control::ControlPlane;
use crate::error::AppError;
use crate::metrics::METRICS;
use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

// 管理服务
pub struct AdminServer {
    // 是否开启调试模式
    debug: bool,
    // 监听地址
    addr: SocketAddr,
    // 控制面
    control: Arc<ControlPlane>,
    // API 授权码
    auth_code: String,
    // 请求超时
    timeout: Duration,
}

impl AdminServer {
    // 创建新的管理服务
    pub fn new(
        debug: bool,
        addr: SocketAddr,
        control: Arc<ControlPlane>,
        auth_code: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            debug,
            addr,
            control,
            auth_code: auth_code.into(),
            timeout,
        }
    }

    /// 构建管理服务路由
    pub fn router(&self) -> Router {
        let mut app = Router::new()
            // 基础服务
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            // 映射管理 API
            .merge(api_routes(self.control.clone(), &self.auth_code));

        // 如果开启调试模式，则启用OpenAPI文档
        if self.debug {
            app = app.merge(openapi_routes());
        }

        app.layer(TimeoutLayer::new(self.timeout))
    }
}

#[async_trait]
impl IntoSubsystem<AppError> for AdminServer {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), AppError> {
        let app = self.router();

        // 绑定TCP监听器
        let listener = match TcpListener::bind(self.addr).await {
            Ok(listener) => {
                info!("Admin service listening on {}", self.addr);
                listener
            }
            Err(e) => {
                error!("Failed to bind admin service: {}", e);
                return Err(AppError::Io(e));
            }
        };

        // 使用tokio::select!监听服务器和关闭信号
        tokio::select! {
            result = axum::serve(listener, app) => {
                if let Err(e) = result {
                    error!("Admin service error: {}", e);
                } else {
                    info!("Admin service completed normally");
                }
                Ok(())
            }
            _ = subsys.on_shutdown_requested() => {
                info!("Shutdown requested, stopping admin service");
                Ok(())
            }
        }
    }
}

// 健康检查处理程序
async fn health_handler() -> &'static str {
    "OK"
}

// 指标处理函数
async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = METRICS.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match String::from_utf8(buffer) {
        Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
        Err(e) => {
            error!("Metrics UTF-8 conversion failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
