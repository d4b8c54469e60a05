//! 工具调用编排器
//!
//! AWAIT_MODEL → {FINAL, DISPATCH_TOOL} → AWAIT_MODEL → … → FINAL | EXHAUSTED | FATAL
//!
//! - 每次迭代调用当前层级模型；被限流时前进到下一层级重试同一迭代（不消耗迭代次数）
//! - 工具调用严格串行：一次只处理一个调用，结果追加到历史后再进入下一轮
//! - 历史只追加：每个工具往返 +2（调用 + 结果），最终回答 +1
//! - 可选 event_tx：向 REPL 等前端推送 ToolCall / ToolResult / TierSwitch / Final

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::state::{LoopState, Outcome, Reply, EXHAUSTED_REPLY};
use crate::core::AgentError;
use crate::llm::{ModelRequest, ModelResponse, ModelTiers};
use crate::memory::{ConversationTurn, ToolCallRequest};
use crate::tools::{ToolExecutor, ToolManifest, ToolResult};

/// 日志中 prompt 预览长度
const PROMPT_PREVIEW_CHARS: usize = 100;

/// 循环参数（均来自配置）
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_iterations: usize,
    pub tool_timeout: Duration,
    pub model_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            tool_timeout: Duration::from_secs(30),
            model_timeout: Duration::from_secs(60),
        }
    }
}

/// 推送给前端的循环事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    TierSwitch { from: String, to: String },
    ToolCall { iteration: usize, name: String },
    ToolResult { name: String, success: bool },
    Final { outcome: Outcome },
}

/// 一次模型调用在限流降级之后的结果
enum Step {
    Final(String),
    Tool(ToolCallRequest),
}

pub struct Orchestrator {
    tiers: ModelTiers,
    executor: Arc<ToolExecutor>,
    manifest: ToolManifest,
    system_instruction: String,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        tiers: ModelTiers,
        executor: Arc<ToolExecutor>,
        system_instruction: impl Into<String>,
        settings: OrchestratorSettings,
    ) -> Self {
        let manifest = executor.manifest();
        Self {
            tiers,
            executor,
            manifest,
            system_instruction: system_instruction.into(),
            settings,
        }
    }

    pub fn manifest(&self) -> &ToolManifest {
        &self.manifest
    }

    pub fn tier_ids(&self) -> Vec<String> {
        self.tiers.ids()
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// 处理一条用户输入，返回最终文本或类型化的致命错误
    pub async fn respond(
        &self,
        prompt: &str,
        prior_history: Vec<ConversationTurn>,
        cancel: &CancellationToken,
    ) -> Result<Reply, AgentError> {
        self.respond_with_events(prompt, prior_history, cancel, None).await
    }

    pub async fn respond_with_events(
        &self,
        prompt: &str,
        prior_history: Vec<ConversationTurn>,
        cancel: &CancellationToken,
        event_tx: Option<&UnboundedSender<LoopEvent>>,
    ) -> Result<Reply, AgentError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AgentError::InvalidInput("prompt must not be empty".into()));
        }
        tracing::info!(
            prompt = %preview(prompt, PROMPT_PREVIEW_CHARS),
            prior_turns = prior_history.len(),
            "respond"
        );

        let mut state = LoopState::new(prior_history, self.settings.max_iterations);
        state.push(ConversationTurn::user(prompt));

        while state.has_budget() {
            state.iteration_count += 1;
            let step = self.await_model(&mut state, cancel, event_tx).await?;

            match step {
                Step::Final(text) => {
                    state.push(ConversationTurn::model(text.clone()));
                    send_event(event_tx, LoopEvent::Final { outcome: Outcome::Final });
                    tracing::info!(iterations = state.iteration_count, "final answer");
                    return Ok(self.finish(state, text, Outcome::Final));
                }
                Step::Tool(call) => {
                    tracing::info!(iteration = state.iteration_count, tool = %call.name, "tool call requested");
                    send_event(
                        event_tx,
                        LoopEvent::ToolCall {
                            iteration: state.iteration_count,
                            name: call.name.clone(),
                        },
                    );
                    state.push(ConversationTurn::tool_call(call.clone()));

                    let result = self.dispatch_tool(&call, cancel).await;
                    if cancel.is_cancelled() {
                        return Err(AgentError::Cancelled);
                    }
                    send_event(
                        event_tx,
                        LoopEvent::ToolResult {
                            name: call.name.clone(),
                            success: result.success,
                        },
                    );
                    state.push(ConversationTurn::tool_result(call.name, result));
                }
            }
        }

        tracing::warn!(max_iterations = state.max_iterations, "iteration budget exhausted");
        state.push(ConversationTurn::model(EXHAUSTED_REPLY));
        send_event(event_tx, LoopEvent::Final { outcome: Outcome::Exhausted });
        Ok(self.finish(state, EXHAUSTED_REPLY.to_string(), Outcome::Exhausted))
    }

    /// 调用当前层级；限流时前进到下一层级重试，全部限流则返回 AllModelsRateLimited
    async fn await_model(
        &self,
        state: &mut LoopState,
        cancel: &CancellationToken,
        event_tx: Option<&UnboundedSender<LoopEvent>>,
    ) -> Result<Step, AgentError> {
        loop {
            let Some(client) = self.tiers.get(state.tier_index) else {
                return Err(AgentError::AllModelsRateLimited {
                    tiers: state.tiers_attempted.clone(),
                });
            };
            let model_id = client.model_id().to_string();
            state.record_attempt(&model_id);

            let request = ModelRequest {
                system_instruction: &self.system_instruction,
                history: &state.history,
                manifest: &self.manifest,
            };
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                r = tokio::time::timeout(self.settings.model_timeout, client.generate(request)) => r,
            };
            let response = response.map_err(|_| AgentError::ModelTimeout {
                model: model_id.clone(),
                after: self.settings.model_timeout,
            })?;

            match response {
                Ok(ModelResponse::FinalText(text)) => return Ok(Step::Final(text)),
                Ok(ModelResponse::ToolCall(call)) => return Ok(Step::Tool(call)),
                Ok(ModelResponse::RateLimited { message }) => {
                    tracing::warn!(model = %model_id, reason = %message, "rate limit hit");
                    match self.tiers.get(state.tier_index + 1) {
                        Some(next) => {
                            tracing::info!(from = %model_id, to = %next.model_id(), "switching to fallback model");
                            send_event(
                                event_tx,
                                LoopEvent::TierSwitch {
                                    from: model_id,
                                    to: next.model_id().to_string(),
                                },
                            );
                            state.tier_index += 1;
                        }
                        None => {
                            tracing::error!(tried = ?state.tiers_attempted, "all models rate limited");
                            return Err(AgentError::AllModelsRateLimited {
                                tiers: state.tiers_attempted.clone(),
                            });
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(model = %model_id, error = %e, "model call failed");
                    return Err(AgentError::LlmError(format!("{model_id}: {e}")));
                }
            }
        }
    }

    /// 清单外的工具不进入适配器，直接合成 UnknownTool 结果
    async fn dispatch_tool(&self, call: &ToolCallRequest, cancel: &CancellationToken) -> ToolResult {
        if !self.manifest.contains(&call.name) {
            tracing::warn!(tool = %call.name, "model requested unknown tool");
            return ToolResult::unknown_tool(&call.name);
        }
        self.executor
            .execute(
                &call.name,
                serde_json::Value::Object(call.arguments.clone()),
                self.settings.tool_timeout,
                cancel,
            )
            .await
    }

    fn finish(&self, state: LoopState, text: String, outcome: Outcome) -> Reply {
        let model = self
            .tiers
            .get(state.tier_index)
            .map(|c| c.model_id().to_string())
            .unwrap_or_default();
        Reply {
            text,
            outcome,
            iterations: state.iteration_count,
            model,
            history: state.history,
        }
    }
}

fn send_event(tx: Option<&UnboundedSender<LoopEvent>>, ev: LoopEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}
