//! 执行层：Agent 运行时（有界 think / act 循环、卡住检测）与工具调用型 agent

pub mod prompts;
pub mod runtime;
pub mod stuck;
pub mod tool_call;

pub use prompts::{
    render, BrowserPrompt, FilePrompt, ManusPrompt, PromptBuilder, PythonPrompt, FINALIZE_PROMPT,
    PLANNING_PROMPT, STEP_PROMPT,
};
pub use runtime::{
    Agent, AgentContext, AgentRuntime, PendingToolCalls, StepInput, DEFAULT_MAX_STEPS, NO_ACTION,
};
pub use stuck::StuckDetector;
pub use tool_call::{ThinkAttempt, ToolCallAgent};
