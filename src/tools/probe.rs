//! 控制面存活探测
//!
//! 需要控制面的工具在真正调用前先探测；探测失败即归类为 NotAvailable，不尝试真实调用。

use async_trait::async_trait;
use serde::Serialize;

/// 探测结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Liveness {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Liveness {
    pub fn up() -> Self {
        Self {
            available: true,
            reason: None,
        }
    }

    pub fn down(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self) -> Liveness;

    /// 健康检查展示用的附加状态（如 MCP 网关是否运行），默认 unknown
    async fn status_detail(&self) -> String {
        "unknown".to_string()
    }
}
