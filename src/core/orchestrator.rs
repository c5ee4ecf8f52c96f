//! 计划编排器：主控循环
//!
//! 负责一个计划的完整生命周期：由模型创建初始计划（失败则落默认计划）、按下标顺序认领步骤、
//! 按标签选 agent 执行、标记完成或累计失败（达上限转 blocked），最后请模型做总结。
//! execute 从不返回 Err，所有失败都以文本形式出现在结果里。

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::core::AgentError;
use crate::llm::{ChatRequest, LlmClient};
use crate::memory::{ConversationStore, Message};
use crate::planning::{format_plan, generate_plan_id, Plan, PlanStore, StepStatus};
use crate::react::{render, AgentRuntime, StepInput, FINALIZE_PROMPT, PLANNING_PROMPT};
use crate::tools::{ToolInvoker, PLANNING_TOOL};

pub const DEFAULT_AGENT: &str = "MANUS";
pub const DEFAULT_MAX_STEP_ATTEMPTS: u32 = 3;

const FALLBACK_STEPS: [&str; 3] = ["Analyze request", "Execute task", "Verify results"];

static STEP_TAG_RE: OnceLock<Regex> = OnceLock::new();

/// 提取步骤文本中的 `[AGENT_NAME]` 标签（小写）；没有则 None
pub fn step_tag(text: &str) -> Option<String> {
    let re = STEP_TAG_RE.get_or_init(|| Regex::new(r"\[([A-Z_]+)\]").unwrap());
    re.captures(text).map(|caps| caps[1].to_lowercase())
}

/// 已认领的步骤
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInfo {
    pub index: usize,
    pub text: String,
    pub tag: Option<String>,
}

/// Agent 注册表：按注册顺序保存，按名称（不区分大小写）路由
pub struct AgentRegistry {
    agents: Vec<Arc<AgentRuntime>>,
    default_agent: String,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT)
    }
}

impl AgentRegistry {
    pub fn new(default_agent: impl Into<String>) -> Self {
        Self {
            agents: Vec::new(),
            default_agent: default_agent.into(),
        }
    }

    pub fn register(&mut self, agent: AgentRuntime) {
        self.agents.push(Arc::new(agent));
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name().to_string()).collect()
    }

    /// 计划结束后释放各 agent 为该会话保留的状态
    pub fn release(&self, plan_id: &str) {
        for agent in &self.agents {
            agent.release(plan_id);
        }
    }

    fn find(&self, name: &str) -> Option<Arc<AgentRuntime>> {
        let upper = name.to_uppercase();
        self.agents
            .iter()
            .find(|a| a.name().to_uppercase() == upper)
            .cloned()
    }

    /// 标签精确匹配 → 默认 agent → 第一个注册的 agent；一个都没有时为配置错误
    pub fn resolve(&self, tag: Option<&str>) -> Result<Arc<AgentRuntime>, AgentError> {
        if let Some(agent) = tag.and_then(|t| self.find(t)) {
            return Ok(agent);
        }
        if let Some(agent) = self.find(&self.default_agent) {
            tracing::info!(
                "Agent not found for type: {:?}. Using {} agent as fallback.",
                tag,
                self.default_agent
            );
            return Ok(agent);
        }
        match self.agents.first() {
            Some(agent) => {
                tracing::warn!(
                    "Agent not found for type: {:?}. Using first available agent as fallback: {}",
                    tag,
                    agent.name()
                );
                Ok(agent.clone())
            }
            None => Err(AgentError::Config("No agents available in the system".to_string())),
        }
    }

    /// 规划提示中的 agent 列表
    pub fn agents_info(&self) -> String {
        let mut info = String::from("Available Agents:\n");
        for agent in &self.agents {
            info.push_str(&format!(
                "- Agent Name : {}\n  Description: {}\n",
                agent.name().to_uppercase(),
                agent.description()
            ));
        }
        info
    }
}

pub struct PlanningOrchestrator {
    llm: Arc<dyn LlmClient>,
    store: Arc<PlanStore>,
    memory: Arc<dyn ConversationStore>,
    agents: AgentRegistry,
    planning_tools: Arc<dyn ToolInvoker>,
    max_step_attempts: u32,
    retrieve_size: usize,
}

impl PlanningOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<PlanStore>,
        memory: Arc<dyn ConversationStore>,
        agents: AgentRegistry,
        planning_tools: Arc<dyn ToolInvoker>,
    ) -> Self {
        Self {
            llm,
            store,
            memory,
            agents,
            planning_tools,
            max_step_attempts: DEFAULT_MAX_STEP_ATTEMPTS,
            retrieve_size: 100,
        }
    }

    pub fn with_max_step_attempts(mut self, attempts: u32) -> Self {
        self.max_step_attempts = attempts.max(1);
        self
    }

    pub fn with_retrieve_size(mut self, n: usize) -> Self {
        self.retrieve_size = n;
        self
    }

    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// 新建计划并执行到结束
    pub async fn execute(&self, goal: &str) -> String {
        self.execute_plan(&generate_plan_id(), goal).await
    }

    /// 以指定 plan_id 执行；goal 为空时继续执行已有计划
    pub async fn execute_plan(&self, plan_id: &str, goal: &str) -> String {
        let outcome = self.run_plan(plan_id, goal).await;
        self.agents.release(plan_id);
        match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(plan_id = %plan_id, error = %e, "plan execution failed");
                format!("Execution failed: {}", e)
            }
        }
    }

    async fn run_plan(&self, plan_id: &str, goal: &str) -> Result<String, AgentError> {
        if !goal.is_empty() {
            self.create_initial_plan(plan_id, goal).await;
            if !self.store.contains(plan_id) {
                tracing::error!("Plan creation failed. Plan ID {} not found in plan store.", plan_id);
                return Ok(format!("Failed to create plan for: {}", goal));
            }
        }

        let mut result = String::new();
        while let Some(step) = self.next_step_info(plan_id)? {
            let agent = self.agents.resolve(step.tag.as_deref())?;
            tracing::info!(
                plan_id = %plan_id,
                step = step.index,
                agent = %agent.name(),
                "dispatching step"
            );
            let step_result = self.execute_step(plan_id, &agent, &step).await?;
            result.push_str(&step_result);
            result.push('\n');
        }
        result.push_str(&self.finalize(plan_id).await);
        Ok(result)
    }

    /// 请模型用 planning 工具建计划；模型调用失败时写入默认的三步计划
    pub async fn create_initial_plan(&self, plan_id: &str, goal: &str) {
        tracing::info!("Creating initial plan with ID: {}", plan_id);

        let vars = HashMap::from([
            ("agents_info".to_string(), self.agents.agents_info()),
            ("query".to_string(), goal.to_string()),
            ("plan_id".to_string(), plan_id.to_string()),
        ]);
        let prompt = vec![Message::user(render(PLANNING_PROMPT, &vars))];
        let request = ChatRequest::new(prompt.clone())
            .with_tools(self.planning_tools.definitions(&[PLANNING_TOOL.to_string()]))
            .with_conversation(plan_id);

        match self.llm.chat(&request).await {
            Ok(response) => {
                tracing::info!("Plan creation result: {}", response.content);
                self.memory.append(plan_id, Message::user(goal));
                self.memory.append(plan_id, response.to_message());
                if response.tool_calls.is_empty() {
                    return;
                }
                match self.planning_tools.execute_tool_calls(&prompt, &response).await {
                    Ok(responses) => self.memory.append(plan_id, Message::tool(responses)),
                    Err(e) => tracing::warn!(plan_id = %plan_id, error = %e, "planning tool call failed"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Creating default plan");
                let steps = FALLBACK_STEPS.iter().map(|s| s.to_string()).collect();
                self.store.put(Plan::new(plan_id, fallback_title(goal), steps));
            }
        }
    }

    /// 认领下标最小的可执行步骤：先置为 in_progress 并写回，再返回
    pub fn next_step_info(&self, plan_id: &str) -> Result<Option<StepInfo>, AgentError> {
        self.store.modify(plan_id, |plan| {
            let Some(index) = plan.first_active() else {
                return Ok(None);
            };
            plan.set_status(index, StepStatus::InProgress);
            let text = plan.steps[index].clone();
            let tag = step_tag(&text);
            Ok(Some(StepInfo { index, text, tag }))
        })
    }

    async fn execute_step(
        &self,
        plan_id: &str,
        agent: &AgentRuntime,
        step: &StepInfo,
    ) -> Result<String, AgentError> {
        let plan_status = format_plan(&self.store.get(plan_id)?);
        let input = StepInput::new(plan_status, step.index, step.text.clone());

        match agent.run(plan_id, input).await {
            Ok(output) => {
                self.store.modify(plan_id, |plan| {
                    plan.set_status(step.index, StepStatus::Completed);
                    plan.reset_attempts(step.index);
                    Ok(())
                })?;
                Ok(output)
            }
            Err(e) => {
                tracing::error!("Error executing step {}: {}", step.index, e);
                let text = format!("Error executing step {}: {}", step.index, e);
                let max_attempts = self.max_step_attempts;
                let blocked = self.store.modify(plan_id, |plan| {
                    let attempts = plan.record_failure(step.index);
                    if attempts >= max_attempts {
                        plan.set_status(step.index, StepStatus::Blocked);
                        plan.set_notes(
                            step.index,
                            format!("Blocked after {} failed attempts: {}", attempts, e),
                        );
                        return Ok(true);
                    }
                    Ok(false)
                })?;
                if blocked {
                    tracing::warn!(plan_id = %plan_id, step = step.index, "step blocked");
                }
                Ok(text)
            }
        }
    }

    /// 渲染最终计划并请模型总结；失败时返回固定文本
    pub async fn finalize(&self, plan_id: &str) -> String {
        let plan_status = match self.store.get(plan_id) {
            Ok(plan) => format_plan(&plan),
            Err(_) => format!("Error: Plan with ID {} not found", plan_id),
        };
        let vars = HashMap::from([("plan_status".to_string(), plan_status)]);

        let mut messages = self.memory.recent(plan_id, self.retrieve_size);
        messages.push(Message::user(render(FINALIZE_PROMPT, &vars)));

        match self.llm.complete(&messages).await {
            Ok(summary) => format!("Plan Summary:\n\n{}", summary),
            Err(e) => {
                tracing::error!("Error finalizing plan with LLM: {}", e);
                "Plan completed. Error generating summary.".to_string()
            }
        }
    }
}

fn fallback_title(goal: &str) -> String {
    let head: String = goal.chars().take(50).collect();
    if goal.chars().count() > 50 {
        format!("Plan for: {}...", head)
    } else {
        format!("Plan for: {}", head)
    }
}
