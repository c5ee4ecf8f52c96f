//! 工具调用型 agent：think 向模型要工具调用，act 交给工具执行器
//!
//! think 的每次尝试归类为 ToolCalls / Retryable / Fatal：模型调用失败（含鉴权、请求被拒）都最多再试
//! think_retries 次，仍失败则本轮降级为“无动作”；只有恢复引擎判为 Abort 的错误才终止 run。
//! act 从不返回错误：工具失败转为一条 "Error: ..." 的工具返回写入记忆；summary 执行成功后请求停止。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine, StopReason};
use crate::llm::{ChatRequest, ChatResponse, LlmClient};
use crate::memory::{ConversationStore, Message, ToolResponse};
use crate::react::{Agent, AgentContext, PendingToolCalls, PromptBuilder, NO_ACTION};
use crate::tools::{ToolInvoker, SUMMARY_TOOL};

pub const DEFAULT_THINK_RETRIES: u32 = 3;
pub const DEFAULT_RETRIEVE_SIZE: usize = 100;

/// 单次 think 尝试的结果
#[derive(Debug)]
pub enum ThinkAttempt {
    /// 模型已回复（工具调用可能为空）
    ToolCalls(ChatResponse),
    Retryable(AgentError),
    Fatal(AgentError),
}

pub struct ToolCallAgent {
    name: String,
    description: String,
    prompts: Arc<dyn PromptBuilder>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolInvoker>,
    memory: Arc<dyn ConversationStore>,
    tool_names: Vec<String>,
    retrieve_size: usize,
    think_retries: u32,
    retry_backoff: Duration,
    recovery: RecoveryEngine,
}

impl ToolCallAgent {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        prompts: Arc<dyn PromptBuilder>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolInvoker>,
        memory: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            prompts,
            llm,
            tools,
            memory,
            tool_names: vec![SUMMARY_TOOL.to_string()],
            retrieve_size: DEFAULT_RETRIEVE_SIZE,
            think_retries: DEFAULT_THINK_RETRIES,
            retry_backoff: Duration::ZERO,
            recovery: RecoveryEngine::new(),
        }
    }

    /// 允许使用的工具；summary 总是附带
    pub fn with_tools(mut self, names: Vec<String>) -> Self {
        let mut names = names;
        if !names.iter().any(|n| n == SUMMARY_TOOL) {
            names.push(SUMMARY_TOOL.to_string());
        }
        self.tool_names = names;
        self
    }

    pub fn with_retrieve_size(mut self, n: usize) -> Self {
        self.retrieve_size = n;
        self
    }

    pub fn with_think_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.think_retries = retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn tool_names(&self) -> &[String] {
        &self.tool_names
    }

    async fn attempt(&self, ctx: &AgentContext, prompt: &[Message]) -> ThinkAttempt {
        let request = ChatRequest::new(prompt.to_vec())
            .with_tools(self.tools.definitions(&self.tool_names))
            .with_conversation(ctx.conversation_id.clone());
        match self.llm.chat(&request).await {
            Ok(response) => ThinkAttempt::ToolCalls(response),
            Err(e) => {
                let err = AgentError::from(e);
                match self.recovery.handle(&err) {
                    RecoveryAction::Retry | RecoveryAction::Degrade => ThinkAttempt::Retryable(err),
                    RecoveryAction::Abort => ThinkAttempt::Fatal(err),
                }
            }
        }
    }

    fn record_tool_responses(&self, ctx: &AgentContext, responses: Vec<ToolResponse>) {
        self.memory
            .append(&ctx.conversation_id, Message::tool(responses));
    }
}

#[async_trait]
impl Agent for ToolCallAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn think(&self, ctx: &mut AgentContext) -> Result<bool, AgentError> {
        ctx.pending = None;
        let (system, user) = self.prompts.build(&ctx.conversation_id, &ctx.input);
        let mut prompt = vec![Message::system(system)];
        prompt.extend(self.memory.recent(&ctx.conversation_id, self.retrieve_size));
        prompt.push(Message::user(user.clone()));

        let max_attempts = self.think_retries + 1;
        for attempt in 1..=max_attempts {
            match self.attempt(ctx, &prompt).await {
                ThinkAttempt::ToolCalls(response) => {
                    self.memory.append(&ctx.conversation_id, Message::user(user));
                    self.memory.append(&ctx.conversation_id, response.to_message());

                    let names: Vec<&str> = response.tool_calls.iter().map(|c| c.name.as_str()).collect();
                    tracing::info!(agent = %self.name, thoughts = %response.content, "thinking complete");
                    tracing::info!(agent = %self.name, selected = names.len(), tools = ?names, "tools selected");

                    let acts = !response.tool_calls.is_empty();
                    if acts {
                        ctx.pending = Some(PendingToolCalls { prompt, response });
                    }
                    return Ok(acts);
                }
                ThinkAttempt::Retryable(err) => {
                    tracing::warn!(agent = %self.name, attempt, max_attempts, error = %err, "think failed");
                    if attempt < max_attempts && !self.retry_backoff.is_zero() {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
                ThinkAttempt::Fatal(err) => {
                    tracing::error!(agent = %self.name, error = %err, "think failed, not retryable");
                    return Err(err);
                }
            }
        }

        tracing::warn!(agent = %self.name, attempts = max_attempts, "think gave up, no action this round");
        Ok(false)
    }

    async fn act(&self, ctx: &mut AgentContext) -> String {
        let Some(pending) = ctx.pending.take() else {
            return NO_ACTION.to_string();
        };

        let result = match self
            .tools
            .execute_tool_calls(&pending.prompt, &pending.response)
            .await
        {
            Ok(responses) => {
                let text = responses
                    .first()
                    .map(|r| r.response_data.clone())
                    .unwrap_or_default();
                if responses.iter().any(|r| r.name == SUMMARY_TOOL) {
                    ctx.request_stop(StopReason::Summarized);
                }
                self.record_tool_responses(ctx, responses);
                tracing::info!(agent = %self.name, result = %text, "tool executing result");
                text
            }
            Err(err) => {
                let text = format!("Error: {}", err);
                tracing::error!(agent = %self.name, error = %err, "tool execution failed");
                if let Some(call) = pending.response.tool_calls.first() {
                    self.record_tool_responses(
                        ctx,
                        vec![ToolResponse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            response_data: text.clone(),
                        }],
                    );
                }
                text
            }
        };

        self.prompts.observe(&ctx.conversation_id, &result);
        result
    }

    fn release(&self, conversation_id: &str) {
        self.prompts.release(conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::llm::{tool_call, LlmError, ScriptedLlmClient, ToolDefinition};
    use crate::memory::{InMemoryConversationStore, Role};
    use crate::react::{AgentRuntime, ManusPrompt, StepInput};
    use crate::tools::{SummaryTool, ToolExecutor, ToolRegistry};

    /// 总是失败的工具执行器
    struct FailingInvoker;

    #[async_trait]
    impl ToolInvoker for FailingInvoker {
        fn definitions(&self, _names: &[String]) -> Vec<ToolDefinition> {
            Vec::new()
        }

        async fn execute_tool_calls(
            &self,
            _prompt: &[Message],
            _response: &ChatResponse,
        ) -> Result<Vec<ToolResponse>, AgentError> {
            Err(AgentError::ToolExecutionFailure("disk full".to_string()))
        }
    }

    fn executor() -> Arc<dyn ToolInvoker> {
        let mut registry = ToolRegistry::new();
        registry.register(SummaryTool);
        Arc::new(ToolExecutor::new(registry, 5))
    }

    fn agent(
        llm: Arc<ScriptedLlmClient>,
        tools: Arc<dyn ToolInvoker>,
        memory: Arc<InMemoryConversationStore>,
    ) -> ToolCallAgent {
        ToolCallAgent::new("Manus", "general", Arc::new(ManusPrompt), llm, tools, memory)
    }

    fn ctx() -> AgentContext {
        AgentContext::new("plan_1", StepInput::new("status", 0, "[MANUS] step"))
    }

    fn summary_call() -> ChatResponse {
        ChatResponse::with_tool_calls("", vec![tool_call("summary", json!({"summary": "all done"}))])
    }

    #[tokio::test]
    async fn test_retryable_failures_use_four_attempts_then_degrade() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Timeout),
            Err(LlmError::Timeout),
            Err(LlmError::Network("reset".into())),
            Err(LlmError::Timeout),
            Ok(summary_call()),
        ]));
        let memory = Arc::new(InMemoryConversationStore::default());
        let agent = agent(llm.clone(), executor(), memory.clone());

        let mut ctx = ctx();
        assert!(!agent.think(&mut ctx).await.unwrap());
        assert_eq!(llm.calls(), 4);
        assert!(ctx.pending.is_none());
        assert_eq!(memory.len("plan_1"), 0);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::RateLimited { retry_after_ms: 10 }),
            Ok(summary_call()),
        ]));
        let memory = Arc::new(InMemoryConversationStore::default());
        let agent = agent(llm.clone(), executor(), memory.clone());

        let mut ctx = ctx();
        assert!(agent.think(&mut ctx).await.unwrap());
        assert_eq!(llm.calls(), 2);
        // user 提示与 assistant 回复各一条
        let recent = memory.recent("plan_1", 10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].role, Role::User);
        assert_eq!(recent[1].tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_request_is_retried() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Api {
                status: 400,
                message: "bad request".into(),
            }),
            Ok(summary_call()),
        ]));
        let memory = Arc::new(InMemoryConversationStore::default());
        let agent = agent(llm.clone(), executor(), memory);

        let mut ctx = ctx();
        assert!(agent.think(&mut ctx).await.unwrap());
        assert_eq!(llm.calls(), 2);
        assert!(ctx.pending.is_some());
    }

    #[tokio::test]
    async fn test_unauthorized_degrades_after_four_attempts() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Unauthorized("bad key".into())),
            Err(LlmError::Unauthorized("bad key".into())),
            Err(LlmError::Unauthorized("bad key".into())),
            Err(LlmError::Unauthorized("bad key".into())),
            Ok(summary_call()),
        ]));
        let memory = Arc::new(InMemoryConversationStore::default());
        let agent = agent(llm.clone(), executor(), memory.clone());

        let mut ctx = ctx();
        assert!(!agent.think(&mut ctx).await.unwrap());
        assert_eq!(llm.calls(), 4);
        assert_eq!(agent.act(&mut ctx).await, NO_ACTION);
        assert_eq!(memory.len("plan_1"), 0);
    }

    #[tokio::test]
    async fn test_request_offers_tools_without_internal_execution() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Ok(ChatResponse::text("hmm"))]));
        let memory = Arc::new(InMemoryConversationStore::default());
        memory.append("plan_1", Message::assistant("earlier"));
        let agent = agent(llm.clone(), executor(), memory);

        assert!(!agent.think(&mut ctx()).await.unwrap());
        let request = &llm.requests()[0];
        assert!(!request.internal_tool_execution);
        assert_eq!(request.conversation_id.as_deref(), Some("plan_1"));
        assert_eq!(request.tools[0].name, "summary");
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "earlier");
        assert!(request.messages[2].content.contains("step 0: [MANUS] step"));
    }

    #[tokio::test]
    async fn test_act_returns_first_response_and_requests_stop_on_summary() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Ok(summary_call())]));
        let memory = Arc::new(InMemoryConversationStore::default());
        let agent = agent(llm, executor(), memory.clone());

        let mut ctx = ctx();
        assert!(agent.think(&mut ctx).await.unwrap());
        assert_eq!(agent.act(&mut ctx).await, "all done");
        assert_eq!(ctx.stop_reason(), Some(StopReason::Summarized));

        let recent = memory.recent("plan_1", 10);
        assert_eq!(recent.last().unwrap().role, Role::Tool);
    }

    #[tokio::test]
    async fn test_act_failure_is_recorded_once() {
        let call = tool_call("browser", json!({"url": "https://example.com"}));
        let llm = Arc::new(ScriptedLlmClient::new(vec![Ok(ChatResponse::with_tool_calls(
            "",
            vec![call.clone()],
        ))]));
        let memory = Arc::new(InMemoryConversationStore::default());
        let agent = agent(llm, Arc::new(FailingInvoker), memory.clone());

        let mut ctx = ctx();
        assert!(agent.think(&mut ctx).await.unwrap());
        let out = agent.act(&mut ctx).await;
        assert!(out.starts_with("Error: "));
        assert!(out.contains("disk full"));
        assert!(ctx.stop_reason().is_none());

        let tool_messages: Vec<Message> = memory
            .recent("plan_1", 10)
            .into_iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_messages.len(), 1);
        assert_eq!(tool_messages[0].tool_responses[0].id, call.id);
        assert_eq!(tool_messages[0].tool_responses[0].name, "browser");
        assert_eq!(tool_messages[0].tool_responses[0].response_data, out);
    }

    #[tokio::test]
    async fn test_runtime_stops_after_summary_round() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Ok(ChatResponse::with_tool_calls(
                "",
                vec![tool_call("unknown_tool", json!({}))],
            )),
            Ok(summary_call()),
        ]));
        let memory = Arc::new(InMemoryConversationStore::default());
        let agent = Arc::new(agent(llm, executor(), memory.clone()));
        let runtime = AgentRuntime::new(agent, memory);

        let out = runtime
            .run("plan_1", StepInput::new("status", 0, "[MANUS] step"))
            .await
            .unwrap();
        assert_eq!(
            out,
            "Round 1: Error: Tool execution failed: Unknown tool: unknown_tool\nRound 2: all done"
        );
    }
}
