//! 编排器构建器：由配置装配计划存储、会话记忆、工具执行器、agent 名册与编排器
//!
//! 所有组件都在这里创建并注入，进程内没有全局单例。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AgentEntry, AgentKind, AppConfig};
use crate::core::{AgentRegistry, PlanningOrchestrator};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{ConversationStore, InMemoryConversationStore};
use crate::planning::PlanStore;
use crate::react::{
    AgentRuntime, BrowserPrompt, FilePrompt, ManusPrompt, PromptBuilder, PythonPrompt,
    StuckDetector, ToolCallAgent,
};
use crate::tools::{PlanningTool, SummaryTool, ToolExecutor, ToolInvoker, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok();

    match (provider.as_str(), api_key) {
        ("openai", Some(key)) => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
                cfg.llm.timeouts.request,
            ))
        }
        ("mock", _) => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient)
        }
        _ => {
            tracing::warn!("No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

fn prompt_for(kind: AgentKind) -> Arc<dyn PromptBuilder> {
    match kind {
        AgentKind::Manus => Arc::new(ManusPrompt),
        AgentKind::Browser => Arc::new(BrowserPrompt),
        AgentKind::File => Arc::new(FilePrompt::default()),
        AgentKind::Python => Arc::new(PythonPrompt::default()),
    }
}

/// 编排器构建器
pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config, llm: None }
    }

    /// 指定 LLM 客户端，不再按配置选择
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        match &self.llm {
            Some(llm) => llm.clone(),
            None => create_llm_from_config(&self.config),
        }
    }

    /// 内置工具：summary 与绑定到计划存储的 planning
    pub fn build_tool_registry(&self, store: Arc<PlanStore>) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(SummaryTool);
        tools.register(PlanningTool::new(store));
        tools
    }

    fn build_agent(
        &self,
        entry: &AgentEntry,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolInvoker>,
        memory: Arc<dyn ConversationStore>,
    ) -> AgentRuntime {
        let agent_cfg = &self.config.agent;
        let agent = ToolCallAgent::new(
            entry.name.clone(),
            entry.description.clone(),
            prompt_for(entry.kind),
            llm,
            tools,
            memory.clone(),
        )
        .with_tools(entry.tools.clone())
        .with_retrieve_size(agent_cfg.memory_retrieve_size)
        .with_think_retries(
            agent_cfg.think_retries,
            Duration::from_millis(agent_cfg.retry_backoff_ms),
        );

        AgentRuntime::new(Arc::new(agent), memory)
            .with_max_steps(entry.max_steps.unwrap_or(agent_cfg.max_steps))
            .with_stuck_detector(StuckDetector::new(
                agent_cfg.stuck_window,
                agent_cfg.stuck_threshold,
            ))
    }

    /// 按名册构建 agent 注册表
    pub fn build_agents(
        &self,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolInvoker>,
        memory: Arc<dyn ConversationStore>,
    ) -> AgentRegistry {
        let mut registry = AgentRegistry::new(self.config.planning.default_agent.clone());
        for entry in &self.config.agents {
            registry.register(self.build_agent(entry, llm.clone(), tools.clone(), memory.clone()));
        }
        tracing::info!(agents = ?registry.names(), "agent roster ready");
        registry
    }

    /// 装配完整的编排器
    pub fn build(&self) -> PlanningOrchestrator {
        let llm = self.build_llm();
        let store = Arc::new(PlanStore::new(self.config.planning.cache_capacity));
        let memory: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new(
            self.config.agent.max_memory_turns,
        ));
        let tools: Arc<dyn ToolInvoker> = Arc::new(ToolExecutor::new(
            self.build_tool_registry(store.clone()),
            self.config.tools.tool_timeout_secs,
        ));
        let agents = self.build_agents(llm.clone(), tools.clone(), memory.clone());

        PlanningOrchestrator::new(llm, store, memory, agents, tools)
            .with_max_step_attempts(self.config.planning.max_step_attempts)
            .with_retrieve_size(self.config.agent.memory_retrieve_size)
    }
}

/// 便捷函数：加载配置（失败则用默认值）并创建构建器
pub fn create_builder(config_path: Option<PathBuf>) -> OrchestratorBuilder {
    let config = crate::config::load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    OrchestratorBuilder::new(config)
}
