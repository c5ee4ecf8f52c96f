//! 记忆层：对话历史（短期）与按会话隔离的存储

pub mod conversation;
pub mod store;

pub use conversation::{ConversationMemory, Message, Role, ToolCall, ToolResponse};
pub use store::{ConversationStore, InMemoryConversationStore};
