//! 对话历史
//!
//! 有序的 ConversationTurn 序列，仅追加不改写；每轮按原样回放给模型。
//! 生命周期属于单次请求，不跨请求共享、不持久化。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::ToolResult;

/// 轮次角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
    Tool,
}

/// 模型发出的工具调用请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// 轮次内容：文本 / 工具调用 / 工具结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnContent {
    Text { text: String },
    ToolCall(ToolCallRequest),
    ToolResult { name: String, result: ToolResult },
}

/// 单个历史轮次
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: TurnContent,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: TurnContent::Text { text: text.into() },
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: TurnContent::Text { text: text.into() },
        }
    }

    /// 工具调用由模型发出，角色为 Model
    pub fn tool_call(call: ToolCallRequest) -> Self {
        Self {
            role: Role::Model,
            content: TurnContent::ToolCall(call),
        }
    }

    pub fn tool_result(name: impl Into<String>, result: ToolResult) -> Self {
        Self {
            role: Role::Tool,
            content: TurnContent::ToolResult {
                name: name.into(),
                result,
            },
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            TurnContent::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        match &self.content {
            TurnContent::ToolResult { result, .. } => Some(result),
            _ => None,
        }
    }
}

/// 前端传来的历史消息（role: user / assistant / model）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// 将前端历史转换为 ConversationTurn：assistant 视为 model；空内容跳过；未知角色报错
pub fn turns_from_messages(messages: &[ChatMessage]) -> Result<Vec<ConversationTurn>, String> {
    let mut turns = Vec::with_capacity(messages.len());
    for (idx, msg) in messages.iter().enumerate() {
        if msg.content.trim().is_empty() {
            continue;
        }
        let turn = match msg.role.to_ascii_lowercase().as_str() {
            "user" => ConversationTurn::user(msg.content.clone()),
            "assistant" | "model" => ConversationTurn::model(msg.content.clone()),
            other => return Err(format!("history[{idx}]: unsupported role '{other}'")),
        };
        turns.push(turn);
    }
    Ok(turns)
}
