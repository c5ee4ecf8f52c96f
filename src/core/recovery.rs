//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供 think 重试循环决定是重试、降级还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作（重试 / 降级 / 终止）
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 根据错误类型返回建议的恢复动作
    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ModelCallFailure(e) if e.is_retryable() => RecoveryAction::Retry,
            AgentError::ModelCallFailure(_) => RecoveryAction::Degrade,
            AgentError::ToolExecutionFailure(_) | AgentError::ToolTimeout(_) => {
                RecoveryAction::Degrade
            }
            AgentError::NotFound(_)
            | AgentError::AlreadyExists(_)
            | AgentError::InvalidState(_)
            | AgentError::Config(_) => RecoveryAction::Abort,
        }
    }
}
