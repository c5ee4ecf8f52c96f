//! 步骤状态机
//!
//! not_started → in_progress（认领）→ completed（执行成功）；
//! blocked 仅由有界重试策略或显式更新写入。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 单个步骤的状态（线上格式为 snake_case）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Blocked,
}

impl StepStatus {
    /// 可被执行（认领）的状态
    pub const ACTIVE: [StepStatus; 2] = [StepStatus::NotStarted, StepStatus::InProgress];

    pub const ALL: [StepStatus; 4] = [
        StepStatus::NotStarted,
        StepStatus::InProgress,
        StepStatus::Completed,
        StepStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::NotStarted => "not_started",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Blocked => "blocked",
        }
    }

    /// 渲染用的状态标记
    pub fn mark(&self) -> &'static str {
        match self {
            StepStatus::NotStarted => "[ ]",
            StepStatus::InProgress => "[→]",
            StepStatus::Completed => "[✓]",
            StepStatus::Blocked => "[!]",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| {
                AgentError::InvalidState(format!(
                    "Invalid step_status: {}. Valid statuses are: not_started, in_progress, completed, blocked",
                    s
                ))
            })
    }
}
