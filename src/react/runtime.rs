//! Agent 运行时：有界 think / act 循环
//!
//! 每轮 think()；返回 true 才 act()。每轮后做卡住检测，结果记为 "Round {n}: ..."。
//! 同一 agent 在同一会话（计划）上的 run 通过 SessionLocks 串行，不同会话互不阻塞；
//! 任何退出路径（包括 run 的 future 被丢弃）都会把状态复位为 Idle。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, AgentStatus, SessionLocks, StopReason};
use crate::llm::ChatResponse;
use crate::memory::{ConversationStore, Message};
use crate::react::StuckDetector;

pub const DEFAULT_MAX_STEPS: usize = 8;
pub const NO_ACTION: &str = "Thinking complete - no action needed";

/// 一次步骤执行的输入；除三个必备键外，其余键可有可无
#[derive(Debug, Clone, Default)]
pub struct StepInput {
    pub plan_status: String,
    pub step_index: usize,
    pub step_text: String,
    pub extras: HashMap<String, String>,
}

impl StepInput {
    pub fn new(plan_status: impl Into<String>, step_index: usize, step_text: impl Into<String>) -> Self {
        Self {
            plan_status: plan_status.into(),
            step_index,
            step_text: step_text.into(),
            extras: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "plan_status" => Some(self.plan_status.clone()),
            "current_step_index" => Some(self.step_index.to_string()),
            "step_text" => Some(self.step_text.clone()),
            other => self.extras.get(other).cloned(),
        }
    }

    /// 模板变量表
    pub fn vars(&self) -> HashMap<String, String> {
        let mut vars = self.extras.clone();
        vars.insert("plan_status".into(), self.plan_status.clone());
        vars.insert("current_step_index".into(), self.step_index.to_string());
        vars.insert("step_text".into(), self.step_text.clone());
        vars
    }
}

/// think 产生、act 消费的待执行工具调用
#[derive(Debug, Clone)]
pub struct PendingToolCalls {
    pub prompt: Vec<Message>,
    pub response: ChatResponse,
}

/// 单次 run 的可变上下文；agent 本身无状态，可被多个计划并发共享
#[derive(Debug)]
pub struct AgentContext {
    pub conversation_id: String,
    pub input: StepInput,
    pub round: usize,
    pub pending: Option<PendingToolCalls>,
    stop: Option<StopReason>,
}

impl AgentContext {
    pub fn new(conversation_id: impl Into<String>, input: StepInput) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            input,
            round: 0,
            pending: None,
            stop: None,
        }
    }

    /// 请求在本轮结束后停止；先到的原因保留
    pub fn request_stop(&mut self, reason: StopReason) {
        self.stop.get_or_insert(reason);
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }
}

/// think / act 能力集
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 是否需要行动（模型是否请求了工具）；Err 为不可恢复的失败，会终止本次 run
    async fn think(&self, ctx: &mut AgentContext) -> Result<bool, AgentError>;

    /// 执行上一次 think 请求的工具，返回本轮结果文本；不返回错误
    async fn act(&self, ctx: &mut AgentContext) -> String;

    /// 计划结束时调用，丢弃为该会话保存的状态
    fn release(&self, conversation_id: &str) {
        let _ = conversation_id;
    }
}

impl fmt::Debug for AgentRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRuntime")
            .field("name", &self.name())
            .field("max_steps", &self.max_steps)
            .field("stuck", &self.stuck)
            .finish()
    }
}

pub struct AgentRuntime {
    agent: Arc<dyn Agent>,
    memory: Arc<dyn ConversationStore>,
    max_steps: usize,
    stuck: StuckDetector,
    sessions: SessionLocks,
}

impl AgentRuntime {
    pub fn new(agent: Arc<dyn Agent>, memory: Arc<dyn ConversationStore>) -> Self {
        Self {
            agent,
            memory,
            max_steps: DEFAULT_MAX_STEPS,
            stuck: StuckDetector::default(),
            sessions: SessionLocks::new(),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_stuck_detector(mut self, stuck: StuckDetector) -> Self {
        self.stuck = stuck;
        self
    }

    pub fn name(&self) -> &str {
        self.agent.name()
    }

    pub fn description(&self) -> &str {
        self.agent.description()
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// 当前持有会话槽位的会话数（运行中或等待中）
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// 计划结束后释放该会话相关的 agent 状态
    pub fn release(&self, conversation_id: &str) {
        self.agent.release(conversation_id);
    }

    /// 该 agent 在某会话上的可观察状态
    pub fn status(&self, conversation_id: &str) -> AgentStatus {
        self.sessions.status(conversation_id)
    }

    async fn step(&self, ctx: &mut AgentContext) -> Result<String, AgentError> {
        if self.agent.think(ctx).await? {
            Ok(self.agent.act(ctx).await)
        } else {
            Ok(NO_ACTION.to_string())
        }
    }

    fn check_stuck(&self, ctx: &mut AgentContext) {
        let recent = self.memory.recent(&ctx.conversation_id, self.stuck.window());
        if self.stuck.is_stuck(&recent) {
            tracing::warn!(
                agent = %self.name(),
                round = ctx.round,
                "Agent stuck detected - missing tool calls, force terminated"
            );
            ctx.request_stop(StopReason::Stuck);
        }
    }

    pub async fn run(&self, conversation_id: &str, input: StepInput) -> Result<String, AgentError> {
        let mut session = self.sessions.acquire(conversation_id).await;
        session.begin()?;

        let mut ctx = AgentContext::new(conversation_id, input);
        let mut results = Vec::new();

        while session.current_step() < self.max_steps && ctx.stop_reason().is_none() {
            let round = session.next_step();
            ctx.round = round;
            tracing::info!(
                agent = %self.name(),
                conversation_id = %conversation_id,
                round,
                max_steps = self.max_steps,
                "Executing round"
            );

            let step_result = self.step(&mut ctx).await?;
            if ctx.stop_reason().is_none() {
                self.check_stuck(&mut ctx);
            }
            if ctx.stop_reason().is_some() {
                session.finish();
            }
            results.push(format!("Round {}: {}", round, step_result));
        }

        match ctx.stop_reason() {
            Some(reason) => {
                tracing::info!(agent = %self.name(), ?reason, rounds = session.current_step(), "run stopped early");
            }
            None => results.push(format!("Terminated: Reached max rounds ({})", self.max_steps)),
        }

        Ok(results.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::memory::InMemoryConversationStore;

    /// 每轮往记忆里写一条 assistant 消息；可指定第几轮请求停止
    struct StubAgent {
        acts: bool,
        idle_messages: bool,
        summarize_at: Option<usize>,
        fail_at: Option<usize>,
        delay: Option<Duration>,
        memory: Arc<dyn ConversationStore>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl StubAgent {
        fn new(memory: Arc<dyn ConversationStore>) -> Self {
            Self {
                acts: false,
                idle_messages: false,
                summarize_at: None,
                fail_at: None,
                delay: None,
                memory,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Agent for StubAgent {
        fn name(&self) -> &str {
            "Stub"
        }

        fn description(&self) -> &str {
            "test agent"
        }

        async fn think(&self, ctx: &mut AgentContext) -> Result<bool, AgentError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.fail_at == Some(ctx.round) {
                return Err(AgentError::InvalidState("backend gone".into()));
            }
            if self.idle_messages {
                self.memory
                    .append(&ctx.conversation_id, Message::assistant("just talking"));
            }
            Ok(self.acts)
        }

        async fn act(&self, ctx: &mut AgentContext) -> String {
            if self.summarize_at == Some(ctx.round) {
                ctx.request_stop(StopReason::Summarized);
                return "summary recorded".to_string();
            }
            format!("acted on {}", ctx.input.step_text)
        }
    }

    fn memory() -> Arc<dyn ConversationStore> {
        Arc::new(InMemoryConversationStore::default())
    }

    fn input() -> StepInput {
        StepInput::new("status", 0, "do it")
    }

    #[tokio::test]
    async fn test_runs_exactly_max_steps_when_never_acting() {
        let memory = memory();
        let runtime = AgentRuntime::new(Arc::new(StubAgent::new(memory.clone())), memory);
        let out = runtime.run("plan_1", input()).await.unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], "Round 1: Thinking complete - no action needed");
        assert!(lines[7].starts_with("Round 8: "));
        assert_eq!(lines[8], "Terminated: Reached max rounds (8)");
        assert_eq!(runtime.status("plan_1"), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_stuck_agent_stops_after_threshold() {
        let memory = memory();
        let mut agent = StubAgent::new(memory.clone());
        agent.idle_messages = true;
        let runtime = AgentRuntime::new(Arc::new(agent), memory);
        let out = runtime.run("plan_1", input()).await.unwrap();
        assert_eq!(out.lines().count(), 3);
        assert!(!out.contains("Reached max rounds"));
    }

    #[tokio::test]
    async fn test_summary_stops_run_after_its_round() {
        let memory = memory();
        let mut agent = StubAgent::new(memory.clone());
        agent.acts = true;
        agent.summarize_at = Some(2);
        let runtime = AgentRuntime::new(Arc::new(agent), memory);
        let out = runtime.run("plan_1", input()).await.unwrap();
        assert_eq!(out, "Round 1: acted on do it\nRound 2: summary recorded");
    }

    #[tokio::test]
    async fn test_error_resets_status_and_instance_is_reusable() {
        let memory = memory();
        let mut agent = StubAgent::new(memory.clone());
        agent.fail_at = Some(2);
        let runtime = AgentRuntime::new(Arc::new(agent), memory).with_max_steps(3);

        let err = runtime.run("plan_1", input()).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidState(_)));
        assert_eq!(runtime.status("plan_1"), AgentStatus::Idle);

        // 第二次 run 仍在第 2 轮失败，说明计数器已重置且实例可复用
        assert!(runtime.run("plan_1", input()).await.is_err());
        assert_eq!(runtime.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_finished_runs_leave_no_session_slots() {
        let memory = memory();
        let mut agent = StubAgent::new(memory.clone());
        agent.acts = true;
        agent.summarize_at = Some(1);
        let runtime = AgentRuntime::new(Arc::new(agent), memory);

        for i in 0..500 {
            runtime.run(&format!("plan_{}", i), input()).await.unwrap();
        }
        assert_eq!(runtime.active_sessions(), 0);
    }

    #[test]
    fn test_debug_shows_name_and_budget() {
        let memory = memory();
        let runtime =
            AgentRuntime::new(Arc::new(StubAgent::new(memory.clone())), memory).with_max_steps(4);
        let text = format!("{:?}", runtime);
        assert!(text.starts_with("AgentRuntime { name: \"Stub\", max_steps: 4"), "{}", text);
    }

    #[tokio::test]
    async fn test_zero_budget_reports_termination() {
        let memory = memory();
        let runtime =
            AgentRuntime::new(Arc::new(StubAgent::new(memory.clone())), memory).with_max_steps(0);
        let out = runtime.run("p", input()).await.unwrap();
        assert_eq!(out, "Terminated: Reached max rounds (0)");
    }

    #[tokio::test]
    async fn test_same_plan_runs_are_serialized() {
        let memory = memory();
        let mut agent = StubAgent::new(memory.clone());
        agent.delay = Some(Duration::from_millis(10));
        let agent = Arc::new(agent);
        let runtime = Arc::new(AgentRuntime::new(agent.clone(), memory).with_max_steps(2));

        let a = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run("plan_1", input()).await }
        });
        let b = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run("plan_1", input()).await }
        });
        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(agent.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_plans_run_concurrently() {
        let memory = memory();
        let mut agent = StubAgent::new(memory.clone());
        agent.delay = Some(Duration::from_millis(50));
        let agent = Arc::new(agent);
        let runtime = Arc::new(AgentRuntime::new(agent.clone(), memory).with_max_steps(1));

        let a = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run("plan_a", input()).await }
        });
        let b = tokio::spawn({
            let runtime = runtime.clone();
            async move { runtime.run("plan_b", input()).await }
        });
        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(agent.max_active.load(Ordering::SeqCst), 2);
    }
}
