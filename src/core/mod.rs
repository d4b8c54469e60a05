//! 核心编排层：错误、循环状态、工具调用编排器

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::{AgentError, ToolError};
pub use orchestrator::{LoopEvent, Orchestrator, OrchestratorSettings};
pub use state::{LoopState, Outcome, Reply, EXHAUSTED_REPLY};
