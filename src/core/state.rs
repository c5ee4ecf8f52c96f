//! 状态定义：Agent 生命周期状态、停止原因、单次会话状态
//!
//! AgentStatus 是对外可观测的生命周期；StopReason 是循环内部的提前退出信号，二者分离，
//! 避免把「最终状态」和「退出信号」混用在同一个字段上。

use serde::Serialize;

use crate::core::AgentError;

/// Agent 生命周期状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Idle,
    Running,
    /// 已收到停止请求、循环正在收尾；run 返回前会被重置为 Idle
    Finished,
}

/// 循环提前结束的原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// summary 工具记录了本步结果
    Summarized,
    /// 最近若干轮模型都没有调用工具
    Stuck,
}

/// 单个 (agent, conversation) 的运行状态：状态机 + 当前轮次
#[derive(Debug)]
pub struct AgentSession {
    status: AgentStatus,
    current_step: usize,
}

impl Default for AgentSession {
    fn default() -> Self {
        Self {
            status: AgentStatus::Idle,
            current_step: 0,
        }
    }
}

impl AgentSession {
    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Idle -> Running，并把轮次清零；非 Idle 时拒绝
    pub fn begin(&mut self) -> Result<(), AgentError> {
        if self.status != AgentStatus::Idle {
            return Err(AgentError::InvalidState(format!(
                "Cannot run agent from status: {:?}",
                self.status
            )));
        }
        self.status = AgentStatus::Running;
        self.current_step = 0;
        Ok(())
    }

    pub fn next_step(&mut self) -> usize {
        self.current_step += 1;
        self.current_step
    }

    pub fn finish(&mut self) {
        self.status = AgentStatus::Finished;
    }

    /// 任意退出路径都回到 Idle，实例可复用
    pub fn end(&mut self) {
        self.status = AgentStatus::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_requires_idle() {
        let mut session = AgentSession::default();
        session.begin().unwrap();
        assert_eq!(session.status(), AgentStatus::Running);

        let err = session.begin().unwrap_err();
        assert!(matches!(err, AgentError::InvalidState(_)));

        session.finish();
        assert!(session.begin().is_err());

        session.end();
        assert!(session.begin().is_ok());
    }

    #[test]
    fn test_begin_resets_step_counter() {
        let mut session = AgentSession::default();
        session.begin().unwrap();
        session.next_step();
        session.next_step();
        assert_eq!(session.current_step(), 2);
        session.end();
        session.begin().unwrap();
        assert_eq!(session.current_step(), 0);
    }
}
