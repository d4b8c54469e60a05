//! 模型层级（主模型 + 降级链）
//!
//! 有序、无状态；编排器在某层被限流时前进到下一层。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::ModelClient;

/// 上游错误文本中出现即视为限流（小写匹配）
pub const RATE_LIMIT_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "quota exceeded",
    "resource_exhausted",
    "please retry",
];

pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}

/// 有序模型层级，至少一层
#[derive(Clone)]
pub struct ModelTiers {
    clients: Vec<Arc<dyn ModelClient>>,
}

impl ModelTiers {
    pub fn new(clients: Vec<Arc<dyn ModelClient>>) -> Result<Self, AgentError> {
        if clients.is_empty() {
            return Err(AgentError::ConfigError("at least one model tier is required".into()));
        }
        Ok(Self { clients })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn ModelClient>> {
        self.clients.get(index)
    }

    pub fn ids(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.model_id().to_string()).collect()
    }
}

impl std::fmt::Debug for ModelTiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
