//! Mock / Scripted LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - MockLlmClient：规划请求回一个单步计划，步骤请求回 summary 工具调用，可离线跑通整条编排。
//! - ScriptedLlmClient：按顺序回放预设的回复或错误，并记录收到的请求，供单测断言。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::llm::{ChatRequest, ChatResponse, LlmClient, LlmError};
use crate::memory::ToolCall;
use crate::tools::{PLANNING_TOOL, SUMMARY_TOOL};

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// 构造一个工具调用（测试与 Mock 共用）
pub fn tool_call(name: &str, arguments: serde_json::Value) -> ToolCall {
    ToolCall {
        id: new_call_id(),
        name: name.to_string(),
        arguments,
    }
}

/// 从规划提示中取出任务描述；取不到时用整段文本
fn planning_task(prompt: &str) -> &str {
    prompt
        .split_once("Task to accomplish:\n")
        .and_then(|(_, rest)| rest.split("\n\n").next())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(prompt)
}

/// Mock 客户端：回显用户最后一条消息，并按可用工具决定回复形态
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let last_user = request.last_user_message().unwrap_or("(no input)");
        let offers = |name: &str| request.tools.iter().any(|t| t.name == name);

        if offers(PLANNING_TOOL) {
            let plan_id = request
                .conversation_id
                .clone()
                .ok_or_else(|| LlmError::InvalidResponse("missing plan id".to_string()))?;
            let task = planning_task(last_user);
            let call = tool_call(
                PLANNING_TOOL,
                serde_json::json!({
                    "command": "create",
                    "plan_id": plan_id,
                    "title": format!("Plan for: {}", task),
                    "steps": [format!("[MANUS] {}", task)],
                }),
            );
            return Ok(ChatResponse::with_tool_calls("Creating plan", vec![call]));
        }

        if offers(SUMMARY_TOOL) {
            let call = tool_call(
                SUMMARY_TOOL,
                serde_json::json!({ "summary": format!("Echo from Mock: {}", last_user) }),
            );
            return Ok(ChatResponse::with_tool_calls("", vec![call]));
        }

        Ok(ChatResponse::text(format!("Echo from Mock: {}", last_user)))
    }
}

/// 回放式客户端：依次弹出预设结果；耗尽后返回 fallback（未设置则 Empty 错误）
#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    fallback: Option<ChatResponse>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<ChatResponse, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// 脚本耗尽后一直返回该回复
    pub fn with_fallback(mut self, response: ChatResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn push(&self, item: Result<ChatResponse, LlmError>) {
        self.script.lock().push_back(item);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let next = self.script.lock().pop_front();
        match next {
            Some(item) => item,
            None => self.fallback.clone().ok_or(LlmError::Empty),
        }
    }
}
