//! 对话历史：请求级、仅追加

pub mod conversation;

pub use conversation::{
    turns_from_messages, ChatMessage, ConversationTurn, Role, ToolCallRequest, TurnContent,
};
