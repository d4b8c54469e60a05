//! 模型客户端抽象
//!
//! 所有后端（Gemini / Mock）实现 ModelClient：输入历史与工具清单，
//! 输出三选一的 ModelResponse（最终文本 / 工具调用 / 被限流）。客户端无状态，可跨请求共享。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::{ConversationTurn, ToolCallRequest};
use crate::tools::ToolManifest;

/// 单次模型请求
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system_instruction: &'a str,
    pub history: &'a [ConversationTurn],
    pub manifest: &'a ToolManifest,
}

/// 模型响应（tagged union）
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    FinalText(String),
    ToolCall(ToolCallRequest),
    /// 当前层级被限流，message 为上游原始描述
    RateLimited { message: String },
}

/// 模型调用的非限流失败（传输错误、上游报错、响应无法解析），对本次请求是致命的
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// 模型标识（层级名），用于日志与 AllModelsRateLimited
    fn model_id(&self) -> &str;

    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelResponse, LlmError>;
}
