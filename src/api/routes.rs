//! HTTP 路由
//!
//! `/search` 直接返回最终结果；`/search/stream` 在同一个 SSE 连接上
//! 先推送可选的 `queued` 事件，再推送唯一的 `result` 事件。

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::{
    ErrorResponse, QueuedNotice, SearchData, SearchRequest, StatusResponse, SuccessResponse,
};
use crate::orchestrator::{QueueStatus, SearchOrchestrator, SearchOutcome};

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SearchOrchestrator>,
    /// 生产模式下错误响应不附带内部细节
    pub production: bool,
    pub started_at: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/search", post(search))
        .route("/search/stream", post(search_stream))
        .route("/cache/clear", post(clear_cache))
        .with_state(state)
}

/// 渲染后的问答响应，`/search` 与 SSE 的 `result` 事件共用
struct Rendered {
    status: StatusCode,
    retry_after: Option<u64>,
    body: Value,
}

impl Rendered {
    fn new(outcome: AppResult<SearchOutcome>, production: bool) -> Self {
        match outcome {
            Ok(outcome) => {
                let data = SearchData::from_result(&outcome.result, outcome.cached_at);
                Self {
                    status: StatusCode::OK,
                    retry_after: None,
                    body: to_json(&SuccessResponse::new(data)),
                }
            }
            Err(err) => Self {
                status: StatusCode::from_u16(err.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                retry_after: err.retry_after(),
                body: to_json(&ErrorResponse::from_error(&err, production)),
            },
        }
    }
}

impl IntoResponse for Rendered {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        json!({ "success": false, "error": format!("响应序列化失败: {}", e) })
    })
}

/// 限流用的客户端标识：`userId` > `X-Forwarded-For` 首个地址 > 对端 IP
pub fn client_id(user_id: Option<&str>, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(id) = user_id.map(str::trim).filter(|id| !id.is_empty()) {
        return id.to_string();
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = forwarded {
        return addr.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// 解析请求体，返回 (问题, 客户端标识)
fn parse_request(
    payload: Result<Json<SearchRequest>, JsonRejection>,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> AppResult<(String, String)> {
    let Json(request) = payload
        .map_err(|e| AppError::Validation(format!("請求格式錯誤: {}", e.body_text())))?;
    let client = client_id(
        request.user_id.as_deref(),
        headers,
        peer.map(|ConnectInfo(addr)| addr),
    );
    Ok((request.question, client))
}

async fn search(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Rendered {
    let outcome = match parse_request(payload, &headers, peer) {
        Ok((question, client)) => state.orchestrator.handle(&question, &client).await,
        Err(e) => Err(e),
    };
    Rendered::new(outcome, state.production)
}

async fn search_stream(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded::<Event>();
    let request = parse_request(payload, &headers, peer);

    tokio::spawn(async move {
        let outcome = match request {
            Ok((question, client)) => {
                let progress = tx.clone();
                state
                    .orchestrator
                    .handle_with_progress(&question, &client, move |status: QueueStatus| {
                        let notice = QueuedNotice {
                            queued: true,
                            position: status.position,
                            estimated_wait_time: status.estimated_wait_secs,
                        };
                        send_event(&progress, "queued", &notice);
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        let rendered = Rendered::new(outcome, state.production);
        send_event(&tx, "result", &rendered.body);
    });

    Sse::new(rx.map(Ok)).keep_alive(KeepAlive::default())
}

fn send_event<T: Serialize>(tx: &mpsc::UnboundedSender<Event>, name: &str, data: &T) {
    match Event::default().event(name).json_data(data) {
        Ok(event) => {
            if tx.unbounded_send(event).is_err() {
                debug!("SSE 连接已关闭，丢弃 {} 事件", name);
            }
        }
        Err(e) => warn!("SSE 事件序列化失败 ({}): {}", name, e),
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.orchestrator.status();
    Json(StatusResponse {
        queue_length: status.scheduler.queue_length,
        in_flight: status.scheduler.in_flight,
        max_concurrent: status.scheduler.max_concurrent,
        cache_size: status.cache_size,
        rate_windows: status.rate_windows,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "timestamp": Utc::now() }))
}

async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    let cleared = state.orchestrator.clear_cache();
    Json(json!({
        "message": "快取已清空",
        "cleared": cleared,
        "timestamp": Utc::now(),
    }))
}

async fn index() -> Json<Value> {
    Json(json!({
        "name": "神學知識庫問答服務",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "search": "POST /search",
            "stream": "POST /search/stream",
            "status": "GET /status",
            "health": "GET /health",
            "clearCache": "POST /cache/clear",
        },
        "features": ["快取", "限流", "排隊", "引用來源整理"],
    }))
}
