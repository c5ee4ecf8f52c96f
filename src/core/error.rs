//! 编排错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：think 阶段根据 AgentError 决定 Retry / Degrade / Abort。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排过程中可能出现的错误（计划查找、状态、模型调用、工具执行、配置）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Model call failed: {0}")]
    ModelCallFailure(#[from] LlmError),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailure(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Config error: {0}")]
    Config(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 重新发起一次全新的请求（网络抖动、限流、超时）
    Retry,
    /// 放弃本轮动作但不中止循环（如工具失败转为错误观察）
    Degrade,
    /// 终止当前 run，把错误交给编排器
    Abort,
}
