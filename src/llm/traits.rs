//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / Scripted）实现 LlmClient：chat（带工具定义，返回文本与工具调用）。
//! 工具一律由编排层执行，请求里 internal_tool_execution 恒为 false。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::{Message, ToolCall};

/// 模型调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("no response")]
    Empty,
}

impl LlmError {
    /// 可重试：网络、超时、限流、5xx、空响应、响应解析失败（模型偶发输出坏 JSON）
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Network(_)
            | LlmError::Timeout
            | LlmError::RateLimited { .. }
            | LlmError::InvalidResponse(_)
            | LlmError::Empty => true,
            LlmError::Api { status, .. } => *status >= 500,
            LlmError::Unauthorized(_) => false,
        }
    }
}

/// 提供给模型的工具定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// 一次模型请求
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    /// 是否允许模型调用层自行执行工具；编排层总是 false
    pub internal_tool_execution: bool,
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            internal_tool_execution: false,
            conversation_id: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// 最后一条 user 消息（Mock / 日志用）
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::memory::Role::User)
            .map(|m| m.content.as_str())
    }
}

/// 模型回复：文本 + 请求的工具调用（可能为空）
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }

    /// 转为写入记忆的 assistant 消息
    pub fn to_message(&self) -> Message {
        Message::assistant_with_tools(self.content.clone(), self.tool_calls.clone())
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 带工具定义的完成请求
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;

    /// 纯文本完成（计划总结等不需要工具的场景）
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let response = self.chat(&ChatRequest::new(messages.to_vec())).await?;
        Ok(response.content)
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
