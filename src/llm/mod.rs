//! 模型层：客户端抽象、层级降级与实现（Gemini / Mock）

pub mod gemini;
pub mod mock;
pub mod tier;
pub mod traits;

pub use gemini::{GeminiClient, GEMINI_BASE_URL, GEMINI_PRIMARY};
pub use mock::MockModelClient;
pub use tier::{is_rate_limit_message, ModelTiers, RATE_LIMIT_MARKERS};
pub use traits::{LlmError, ModelClient, ModelRequest, ModelResponse};
