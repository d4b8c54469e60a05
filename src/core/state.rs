//! 单次请求的循环状态与返回值
//!
//! LoopState 在处理一条用户输入时创建、结束时丢弃，不在并发请求间共享。

use serde::Serialize;

use crate::memory::ConversationTurn;

/// 迭代预算耗尽时的兜底回复
pub const EXHAUSTED_REPLY: &str =
    "I apologize, but I reached the maximum number of tool uses. Please try rephrasing your request.";

#[derive(Debug, Clone)]
pub struct LoopState {
    pub iteration_count: usize,
    pub max_iterations: usize,
    pub history: Vec<ConversationTurn>,
    /// 当前使用的模型层级下标；请求内降级后不回退
    pub tier_index: usize,
    /// 按顺序尝试过的层级（去重）
    pub tiers_attempted: Vec<String>,
}

impl LoopState {
    pub fn new(prior_history: Vec<ConversationTurn>, max_iterations: usize) -> Self {
        Self {
            iteration_count: 0,
            max_iterations,
            history: prior_history,
            tier_index: 0,
            tiers_attempted: Vec::new(),
        }
    }

    /// 仅追加
    pub fn push(&mut self, turn: ConversationTurn) {
        self.history.push(turn);
    }

    pub fn has_budget(&self) -> bool {
        self.iteration_count < self.max_iterations
    }

    pub fn record_attempt(&mut self, model_id: &str) {
        if !self.tiers_attempted.iter().any(|t| t == model_id) {
            self.tiers_attempted.push(model_id.to_string());
        }
    }
}

/// 结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Final,
    Exhausted,
}

/// respond 的返回：最终文本 + 结束方式 + 完整历史（含本次追加的轮次）
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub text: String,
    pub outcome: Outcome,
    pub iterations: usize,
    /// 产生最后一轮的模型层级
    pub model: String,
    pub history: Vec<ConversationTurn>,
}

impl Reply {
    pub fn is_exhausted(&self) -> bool {
        self.outcome == Outcome::Exhausted
    }
}
