//! 计划数据模型
//!
//! steps 与 step_statuses / step_notes / step_attempts 按下标对齐；
//! 后三者可能短于 steps，读取时按默认值补齐，写入前先 pad。

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

use crate::planning::StepStatus;

static LAST_PLAN_MILLIS: AtomicI64 = AtomicI64::new(0);

/// 生成 "plan_" + 毫秒时间戳；同一进程内严格递增
pub fn generate_plan_id() -> String {
    let now = chrono::Utc::now().timestamp_millis();
    let mut prev = LAST_PLAN_MILLIS.load(Ordering::SeqCst);
    loop {
        let next = now.max(prev + 1);
        match LAST_PLAN_MILLIS.compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return format!("plan_{}", next),
            Err(actual) => prev = actual,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub title: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub step_statuses: Vec<StepStatus>,
    #[serde(default)]
    pub step_notes: Vec<String>,
    #[serde(default)]
    pub step_attempts: Vec<u32>,
}

/// 计划的部分更新：title 与 steps 均可选
#[derive(Debug, Clone, Default)]
pub struct PlanPatch {
    pub title: Option<String>,
    pub steps: Option<Vec<String>>,
}

impl PlanPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            steps: None,
        }
    }

    pub fn steps(steps: Vec<String>) -> Self {
        Self {
            title: None,
            steps: Some(steps),
        }
    }
}

impl Plan {
    pub fn new(id: impl Into<String>, title: impl Into<String>, steps: Vec<String>) -> Self {
        let n = steps.len();
        Self {
            id: id.into(),
            title: title.into(),
            steps,
            step_statuses: vec![StepStatus::NotStarted; n],
            step_notes: vec![String::new(); n],
            step_attempts: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn status(&self, index: usize) -> StepStatus {
        self.step_statuses.get(index).copied().unwrap_or_default()
    }

    pub fn notes(&self, index: usize) -> &str {
        self.step_notes.get(index).map(String::as_str).unwrap_or("")
    }

    pub fn attempts(&self, index: usize) -> u32 {
        self.step_attempts.get(index).copied().unwrap_or(0)
    }

    /// 补齐三个对齐列表到 steps 的长度
    pub fn pad(&mut self) {
        let n = self.steps.len();
        if self.step_statuses.len() < n {
            self.step_statuses.resize(n, StepStatus::NotStarted);
        }
        if self.step_notes.len() < n {
            self.step_notes.resize(n, String::new());
        }
        if self.step_attempts.len() < n {
            self.step_attempts.resize(n, 0);
        }
    }

    pub fn set_status(&mut self, index: usize, status: StepStatus) {
        self.pad();
        if let Some(slot) = self.step_statuses.get_mut(index) {
            *slot = status;
        }
    }

    pub fn set_notes(&mut self, index: usize, notes: impl Into<String>) {
        self.pad();
        if let Some(slot) = self.step_notes.get_mut(index) {
            *slot = notes.into();
        }
    }

    /// 记一次失败，返回累计失败次数
    pub fn record_failure(&mut self, index: usize) -> u32 {
        self.pad();
        match self.step_attempts.get_mut(index) {
            Some(slot) => {
                *slot += 1;
                *slot
            }
            None => 0,
        }
    }

    /// 清零连续失败计数（步骤成功或被显式改状态时）
    pub fn reset_attempts(&mut self, index: usize) {
        self.pad();
        if let Some(slot) = self.step_attempts.get_mut(index) {
            *slot = 0;
        }
    }

    pub fn completed_count(&self) -> usize {
        (0..self.len())
            .filter(|&i| self.status(i) == StepStatus::Completed)
            .count()
    }

    /// 第一个处于可执行状态的步骤下标
    pub fn first_active(&self) -> Option<usize> {
        (0..self.len()).find(|&i| self.status(i).is_active())
    }

    /// 应用部分更新；替换 steps 时，同下标且文本未变的步骤保留状态与备注，其余重置
    pub fn apply(&mut self, patch: PlanPatch) {
        if let Some(title) = patch.title.filter(|t| !t.is_empty()) {
            self.title = title;
        }
        if let Some(steps) = patch.steps {
            let mut statuses = Vec::with_capacity(steps.len());
            let mut notes = Vec::with_capacity(steps.len());
            let mut attempts = Vec::with_capacity(steps.len());
            for (i, step) in steps.iter().enumerate() {
                if self.steps.get(i) == Some(step) {
                    statuses.push(self.status(i));
                    notes.push(self.notes(i).to_string());
                    attempts.push(self.attempts(i));
                } else {
                    statuses.push(StepStatus::NotStarted);
                    notes.push(String::new());
                    attempts.push(0);
                }
            }
            self.steps = steps;
            self.step_statuses = statuses;
            self.step_notes = notes;
            self.step_attempts = attempts;
        }
    }
}
