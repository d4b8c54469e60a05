//! 工具结果
//!
//! 适配器的唯一输出形态：无论成功、超时还是退出码非零，都落成 ToolResult 回灌给模型。
//! 输出在入历史前做清洗（去 ANSI 转义与控制字符）并截断。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::ToolError;

/// 空输出时的占位文本
pub const EMPTY_OUTPUT: &str = "(command completed successfully, no output)";

const TRUNCATED_MARKER: &str = "\n... (output truncated)";

/// 失败分类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArguments,
    Timeout,
    NonZeroExit,
    NotAvailable,
    Cancelled,
}

/// 一次工具调用的结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        let output = output.into();
        let output = if output.trim().is_empty() {
            EMPTY_OUTPUT.to_string()
        } else {
            output
        };
        Self {
            success: true,
            output,
            error_kind: None,
            exit_code: None,
        }
    }

    pub fn failure(err: &ToolError) -> Self {
        Self {
            success: false,
            output: format!("Error: {err}"),
            error_kind: Some(err.kind()),
            exit_code: err.exit_code(),
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::failure(&ToolError::UnknownTool(name.to_string()))
    }

    /// 清洗并截断输出（按字符计数）
    pub fn sanitized(mut self, max_chars: usize) -> Self {
        self.output = sanitize_output(&self.output, max_chars);
        self
    }
}

fn ansi_pattern() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b[@-Z\\-_]").ok())
        .as_ref()
}

/// 去除 ANSI 转义与除换行/制表符外的控制字符，超过 max_chars 时截断并追加标记
pub fn sanitize_output(raw: &str, max_chars: usize) -> String {
    let stripped = match ansi_pattern() {
        Some(re) => re.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    };
    let cleaned: String = stripped
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let cleaned = cleaned.trim_end().to_string();

    if max_chars == 0 || cleaned.chars().count() <= max_chars {
        return cleaned;
    }
    let mut clipped: String = cleaned.chars().take(max_chars).collect();
    clipped.push_str(TRUNCATED_MARKER);
    clipped
}
