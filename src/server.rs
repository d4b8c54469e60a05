//! HTTP 服务
//!
//! - GET  /        服务信息
//! - GET  /health  docker / LLM / MCP 网关状态（healthy / partial / unhealthy）
//! - POST /chat    {prompt, history} -> {reply}
//!
//! /chat 的错误映射：422 参数错误，503 控制面不可用，429 全部模型限流，504 请求超时，500 其他。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::agent::AgentComponents;
use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator};
use crate::memory::{turns_from_messages, ChatMessage};
use crate::tools::LivenessProbe;

/// 全部模型限流时返回给用户的提示
pub const RATE_LIMITED_REPLY: &str =
    "I'm experiencing rate limits across all available models. Please try again in a minute.";

/// 服务状态
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub probe: Arc<dyn LivenessProbe>,
    pub llm_configured: bool,
    pub name: String,
    pub version: String,
    pub container_name: String,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(components: AgentComponents, cfg: &AppConfig) -> Self {
        Self {
            orchestrator: components.orchestrator,
            probe: components.probe,
            llm_configured: components.llm_configured,
            name: cfg.app.name.clone(),
            version: cfg.app.version.clone(),
            container_name: cfg.tools.container_name.clone(),
            request_timeout: Duration::from_secs(cfg.app.request_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub docker_connected: bool,
    pub llm_configured: bool,
    pub container_name: String,
    pub container_status: String,
    pub checked_at: String,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: String,
    pub version: String,
    pub status: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// 错误响应：状态码 + {detail}
#[derive(Debug)]
pub struct ApiError(pub StatusCode, pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { detail: self.1 })).into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        let status = status_for(&e);
        let detail = match &e {
            AgentError::AllModelsRateLimited { .. } => RATE_LIMITED_REPLY.to_string(),
            AgentError::Cancelled => "Request timed out".to_string(),
            other => other.to_string(),
        };
        ApiError(status, detail)
    }
}

pub fn status_for(e: &AgentError) -> StatusCode {
    match e {
        AgentError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AgentError::AllModelsRateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        AgentError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        AgentError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        AgentError::LlmError(_) | AgentError::ModelTimeout { .. } | AgentError::ConfigError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .with_state(state)
}

async fn root(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let endpoints = BTreeMap::from([("chat", "POST /chat"), ("health", "GET /health")]);
    Json(InfoResponse {
        name: state.name.clone(),
        version: state.version.clone(),
        status: "running",
        endpoints,
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let liveness = state.probe.probe().await;
    let container_status = if liveness.available {
        state.probe.status_detail().await
    } else {
        "unknown".to_string()
    };
    let status = match (liveness.available, state.llm_configured) {
        (true, true) => "healthy",
        (false, false) => "unhealthy",
        _ => "partial",
    };
    Json(HealthResponse {
        status: status.to_string(),
        docker_connected: liveness.available,
        llm_configured: state.llm_configured,
        container_name: state.container_name.clone(),
        container_status,
        checked_at: chrono::Utc::now().to_rfc3339(),
    })
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    if req.prompt.trim().is_empty() {
        return Err(ApiError(
            StatusCode::UNPROCESSABLE_ENTITY,
            "prompt must not be empty".into(),
        ));
    }
    let history = turns_from_messages(&req.history)
        .map_err(|e| ApiError(StatusCode::UNPROCESSABLE_ENTITY, e))?;

    let liveness = state.probe.probe().await;
    if !liveness.available {
        let reason = liveness.reason.unwrap_or_else(|| "probe failed".into());
        tracing::warn!(%request_id, reason = %reason, "control surface unavailable");
        return Err(AgentError::ServiceUnavailable {
            service: "docker".into(),
            reason,
        }
        .into());
    }

    // 连接断开时 handler future 被丢弃，drop guard 触发取消；超时计时器同样触发取消
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let timer = {
        let cancel = cancel.clone();
        let limit = state.request_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            cancel.cancel();
        })
    };

    let result = state.orchestrator.respond(&req.prompt, history, &cancel).await;
    timer.abort();

    match result {
        Ok(reply) => {
            tracing::info!(
                %request_id,
                iterations = reply.iterations,
                model = %reply.model,
                exhausted = reply.is_exhausted(),
                "chat done"
            );
            Ok(Json(ChatResponse { reply: reply.text }))
        }
        Err(e) => {
            tracing::error!(%request_id, error = %e, "chat failed");
            Err(e.into())
        }
    }
}
