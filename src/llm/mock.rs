//! Mock 模型客户端（用于测试与离线运行，无需 API）
//!
//! 按脚本顺序返回预置响应；脚本耗尽后回显最后一条用户消息作为最终文本。
//! 记录调用次数与每次看到的历史长度，便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmError, ModelClient, ModelRequest, ModelResponse};
use crate::memory::Role;

pub struct MockModelClient {
    id: String,
    script: Mutex<VecDeque<Result<ModelResponse, LlmError>>>,
    seen_history_lens: Mutex<Vec<usize>>,
}

impl MockModelClient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            seen_history_lens: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responses(self, responses: Vec<ModelResponse>) -> Self {
        for r in responses {
            self.push(Ok(r));
        }
        self
    }

    pub fn push(&self, response: Result<ModelResponse, LlmError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// 总调用次数
    pub fn calls(&self) -> usize {
        self.history_lengths().len()
    }

    /// 每次调用时收到的历史长度
    pub fn history_lengths(&self) -> Vec<usize> {
        self.seen_history_lens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    fn model_id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelResponse, LlmError> {
        self.seen_history_lens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.history.len());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(response) = next {
            return response;
        }

        let last_user = request
            .history
            .iter()
            .rev()
            .filter(|t| t.role == Role::User)
            .find_map(|t| t.text())
            .unwrap_or("(no input)");
        Ok(ModelResponse::FinalText(format!("Echo from Mock: {last_user}")))
    }
}
