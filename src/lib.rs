//! mcp-assistant - LLM 工具调用编排器
//!
//! 用户以自然语言提问，托管模型决定是否调用工具（Docker / MCP 网关），
//! 编排器在有限迭代内驱动「模型 → 工具 → 结果回灌」直到得到最终回答。
//!
//! 模块划分：
//! - **agent**: 组件组装（模型层级、工具、编排器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、循环状态、工具调用编排器
//! - **llm**: 模型客户端抽象与实现（Gemini / Mock）与层级降级
//! - **memory**: 请求级对话历史
//! - **server**: HTTP 接口（/、/health、/chat），需 `web` feature
//! - **tools**: 工具注册表、清单、子进程执行与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
#[cfg(feature = "web")]
pub mod server;
pub mod tools;

pub use crate::core::{AgentError, Orchestrator, OrchestratorSettings, Outcome, Reply};
