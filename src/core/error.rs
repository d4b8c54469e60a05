//! 错误类型
//!
//! - AgentError：编排层错误，向服务层传播（映射为 HTTP 状态码）
//! - ToolError：适配器内部错误，在 ToolExecutor 边界统一转为 ToolResult，不会越过边界

use std::time::Duration;

use thiserror::Error;

use crate::tools::ToolErrorKind;

/// 编排过程中的致命错误（工具失败不在此列，工具失败会作为 tool-result 回灌给模型）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 所有模型层级均被限流；tiers 为按顺序尝试过的模型
    #[error("All models rate limited (tried: {})", .tiers.join(", "))]
    AllModelsRateLimited { tiers: Vec<String> },

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Model {} did not respond within {}", .model, human_duration(.after))]
    ModelTimeout { model: String, after: Duration },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Service unavailable: {service} ({reason})")]
    ServiceUnavailable { service: String, reason: String },

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 工具执行失败（适配器内部）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Unknown function '{0}'")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Command timed out after {}", human_duration(.after))]
    Timeout { after: Duration },

    /// output 为 stderr（为空时取 stdout，再为空时为退出码描述）
    #[error("{output}")]
    NonZeroExit { code: i32, output: String },

    #[error("Control surface not available: {0}")]
    NotAvailable(String),

    #[error("Cancelled")]
    Cancelled,
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::UnknownTool(_) => ToolErrorKind::UnknownTool,
            ToolError::InvalidArguments(_) => ToolErrorKind::InvalidArguments,
            ToolError::Timeout { .. } => ToolErrorKind::Timeout,
            ToolError::NonZeroExit { .. } => ToolErrorKind::NonZeroExit,
            ToolError::NotAvailable(_) => ToolErrorKind::NotAvailable,
            ToolError::Cancelled => ToolErrorKind::Cancelled,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ToolError::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// 30s -> "30 seconds"，不足一秒时以毫秒表示
pub(crate) fn human_duration(d: &Duration) -> String {
    if d.as_millis() >= 1000 && d.subsec_millis() == 0 {
        let secs = d.as_secs();
        if secs == 1 {
            "1 second".to_string()
        } else {
            format!("{secs} seconds")
        }
    } else {
        format!("{} ms", d.as_millis())
    }
}
