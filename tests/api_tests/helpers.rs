//! 管理 API 测试辅助模块

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use portrelay::{
    admin::AdminServer,
    api::ApiResponse,
    control::ControlPlane,
    error::AppError,
    listener::{ListenerManager, SocketListenerFactory},
    registry::MappingRegistry,
    relay::RelaySettings,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceExt;

pub const AUTH_CODE: &str = "test-secret";

// TestApp 结构体，封装了测试环境
pub struct TestApp {
    pub router: Router,
    pub registry: Arc<MappingRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), AppError>>>,
}

impl TestApp {
    // 发送请求，可选择携带授权码
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        auth: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(code) = auth {
            builder = builder.header("Authorization", code);
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, path: &str) -> Response {
        self.request(Method::GET, path, None, Some(AUTH_CODE)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Response {
        self.request(Method::POST, path, Some(body), Some(AUTH_CODE))
            .await
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.request(Method::DELETE, path, None, Some(AUTH_CODE))
            .await
    }

    // 停止后台的监听器管理器
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap().unwrap();
        }
    }
}

// 启动测试应用，监听器管理器在后台运行
pub async fn spawn_app() -> TestApp {
    let registry = Arc::new(MappingRegistry::new());
    let factory = Arc::new(SocketListenerFactory::new(RelaySettings::default()));
    let manager = ListenerManager::new(registry.clone(), factory, Duration::from_millis(100));
    let control = Arc::new(ControlPlane::new(
        registry.clone(),
        manager.reports(),
        Duration::from_secs(5),
    ));

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(manager.run_with_shutdown(async {
        let _ = rx.await;
    }));

    let admin = AdminServer::new(
        true,
        "127.0.0.1:0".parse().unwrap(),
        control,
        AUTH_CODE,
        Duration::from_secs(30),
    );

    TestApp {
        router: admin.router(),
        registry,
        shutdown: Some(tx),
        handle: Some(handle),
    }
}

// 获取一个当前空闲的端口
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// 读取响应体并解析为统一响应结构
pub async fn read_json<T: DeserializeOwned>(response: Response) -> (StatusCode, ApiResponse<T>) {
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = serde_json::from_slice(&body).unwrap_or_else(|e| {
        panic!(
            "invalid response body {:?}: {}",
            String::from_utf8_lossy(&body),
            e
        )
    });
    (status, parsed)
}
