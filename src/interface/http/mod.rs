//! 웹훅 수신/피드백 HTTP 인터페이스(axum).

mod feedback;
mod webhook;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::application::ports::{InteractionRecorder, TaskQueue};

pub use webhook::SignedWebhook;

/// 핸들러가 공유하는 상태. 큐와 기록 저장소만 알고 파이프라인은 모른다.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<dyn TaskQueue>,
    pub recorder: Arc<dyn InteractionRecorder>,
    /// 설정된 경우 `X-Hub-Signature-256`을 검증한다.
    pub webhook_secret: Option<Arc<str>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/webhook", post(webhook::receive))
        .route("/feedback", post(feedback::submit))
        .with_state(state)
}

/// 종료 신호가 올 때까지 HTTP 서버를 돌린다.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!(%addr, "http server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "reviewpilot webhook receiver" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// 핸들러 오류 응답. 상태 코드와 짧은 메시지만 노출한다.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        } else {
            tracing::warn!(status = %self.status, error = %self.message, "request rejected");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
