//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub planning: PlanningSection,
    pub tools: ToolsSection,
    /// [[agents]] 名册；缺省为 Manus / BrowserAgent / FileAgent / PythonAgent
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            agent: AgentSection::default(),
            planning: PlanningSection::default(),
            tools: ToolsSection::default(),
            agents: default_agents(),
        }
    }
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：mock / openai；openai 还需要 OPENAI_API_KEY
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "mock".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [agent] 段：单个 agent 的运行预算、重试与卡住检测
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_steps: usize,
    /// think 失败后的额外重试次数
    pub think_retries: u32,
    pub retry_backoff_ms: u64,
    pub stuck_window: usize,
    /// 0 表示关闭卡住检测
    pub stuck_threshold: usize,
    /// 每次组装提示时取回的最近记忆条数
    pub memory_retrieve_size: usize,
    /// 每个会话保留的对话轮数；一轮按两条消息计，实际最多保留 max_memory_turns * 2 条
    pub max_memory_turns: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: 8,
            think_retries: 3,
            retry_backoff_ms: 0,
            stuck_window: 6,
            stuck_threshold: 3,
            memory_retrieve_size: 100,
            max_memory_turns: 100,
        }
    }
}

/// [planning] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanningSection {
    /// 计划缓存容量（LRU）
    pub cache_capacity: usize,
    /// 同一步连续失败多少次后转为 blocked
    pub max_step_attempts: u32,
    /// 步骤无标签或标签无匹配时使用的 agent 名
    pub default_agent: String,
}

impl Default for PlanningSection {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            max_step_attempts: 3,
            default_agent: "MANUS".to_string(),
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// 提示词特化种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[default]
    Manus,
    Browser,
    File,
    Python,
}

/// [[agents]] 名册条目
#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: AgentKind,
    /// 未设置时用 [agent].max_steps
    pub max_steps: Option<usize>,
    /// 允许调用的工具；summary 总是附带
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AgentEntry {
    fn new(name: &str, description: &str, kind: AgentKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            max_steps: None,
            tools: Vec::new(),
        }
    }
}

fn default_agents() -> Vec<AgentEntry> {
    vec![
        AgentEntry::new(
            "Manus",
            "A versatile agent that can solve various tasks using multiple tools",
            AgentKind::Manus,
        ),
        AgentEntry::new(
            "BrowserAgent",
            "A browser agent that can control a browser to accomplish tasks",
            AgentKind::Browser,
        ),
        AgentEntry::new(
            "FileAgent",
            "A file operations agent that can read, write and manage files",
            AgentKind::File,
        ),
        AgentEntry::new(
            "PythonAgent",
            "An agent that can execute Python code to accomplish tasks",
            AgentKind::Python,
        ),
    ]
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.agent.max_steps, 8);
        assert_eq!(cfg.agent.stuck_window, 6);
        assert_eq!(cfg.planning.cache_capacity, 1000);
        assert_eq!(cfg.planning.default_agent, "MANUS");
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.agents.len(), 4);
        assert_eq!(cfg.agents[0].name, "Manus");
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[agent]
max_steps = 4
stuck_threshold = 0

[planning]
max_step_attempts = 5

[[agents]]
name = "Coder"
description = "writes code"
kind = "python"
max_steps = 2
tools = ["planning"]
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.agent.max_steps, 4);
        assert_eq!(cfg.agent.stuck_threshold, 0);
        assert_eq!(cfg.agent.think_retries, 3);
        assert_eq!(cfg.planning.max_step_attempts, 5);
        assert_eq!(cfg.planning.cache_capacity, 1000);
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.agents[0].kind, AgentKind::Python);
        assert_eq!(cfg.agents[0].max_steps, Some(2));
        assert_eq!(cfg.agents[0].tools, vec!["planning".to_string()]);
    }
}
