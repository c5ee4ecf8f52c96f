//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，按模型回复中的工具调用逐个执行，
//! 超时或失败时整体转为 AgentError（ToolTimeout / ToolExecutionFailure）；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::{ChatResponse, ToolDefinition};
use crate::memory::{Message, ToolResponse};
use crate::tools::{Tool, ToolRegistry};

/// 工具执行协作方：给出工具定义，执行一次模型回复里的全部工具调用
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    fn definitions(&self, names: &[String]) -> Vec<ToolDefinition>;

    /// prompt 为产生该回复的请求消息；任一调用失败则整体失败
    async fn execute_tool_calls(
        &self,
        prompt: &[Message],
        response: &ChatResponse,
    ) -> Result<Vec<ToolResponse>, AgentError>;
}

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecutionFailure；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailure(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

#[async_trait]
impl ToolInvoker for ToolExecutor {
    fn definitions(&self, names: &[String]) -> Vec<ToolDefinition> {
        self.registry.definitions(names)
    }

    async fn execute_tool_calls(
        &self,
        prompt: &[Message],
        response: &ChatResponse,
    ) -> Result<Vec<ToolResponse>, AgentError> {
        tracing::debug!(
            prompt_messages = prompt.len(),
            calls = response.tool_calls.len(),
            "executing tool calls"
        );
        let mut responses = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            let data = self.execute(&call.name, call.arguments.clone()).await?;
            responses.push(ToolResponse {
                id: call.id.clone(),
                name: call.name.clone(),
                response_data: data,
            });
        }
        Ok(responses)
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::llm::tool_call;
    use crate::tools::SummaryTool;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn executor(timeout_secs: u64) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(SummaryTool);
        registry.register(SlowTool);
        ToolExecutor::new(registry, timeout_secs)
    }

    #[tokio::test]
    async fn test_execute_tool_calls_in_order() {
        let exec = executor(5);
        let response = ChatResponse::with_tool_calls(
            "",
            vec![
                tool_call("summary", json!({"summary": "first"})),
                tool_call("summary", json!({"summary": "second"})),
            ],
        );
        let out = exec.execute_tool_calls(&[], &response).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].response_data, "first");
        assert_eq!(out[1].id, response.tool_calls[1].id);
    }

    #[tokio::test]
    async fn test_failure_fails_whole_batch() {
        let exec = executor(5);
        let response = ChatResponse::with_tool_calls(
            "",
            vec![
                tool_call("summary", json!({"summary": "ok"})),
                tool_call("unknown", json!({})),
            ],
        );
        let err = exec.execute_tool_calls(&[], &response).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailure(ref m) if m == "Unknown tool: unknown"));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_tool_timeout() {
        let exec = executor(1);
        let err = exec.execute("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(ref name) if name == "slow"));
    }
}
