//! 计划文本渲染（步骤上下文与最终总结都使用这份文本）

use std::fmt::Write as _;

use crate::planning::{Plan, StepStatus};

/// 各状态的步骤数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub completed: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub not_started: usize,
}

impl StatusCounts {
    pub fn of(plan: &Plan) -> Self {
        let mut counts = Self::default();
        for i in 0..plan.len() {
            counts.bump(plan.status(i));
        }
        counts
    }

    /// 从渲染文本的步骤行反推计数
    pub fn from_rendered(text: &str) -> Self {
        let mut counts = Self::default();
        let mut in_steps = false;
        for line in text.lines() {
            if line == "Steps:" {
                in_steps = true;
                continue;
            }
            if !in_steps || line.starts_with(' ') {
                continue;
            }
            let Some((_, rest)) = line.split_once(". ") else {
                continue;
            };
            if let Some(status) = StepStatus::ALL.iter().find(|s| rest.starts_with(s.mark())) {
                counts.bump(*status);
            }
        }
        counts
    }

    fn bump(&mut self, status: StepStatus) {
        match status {
            StepStatus::Completed => self.completed += 1,
            StepStatus::InProgress => self.in_progress += 1,
            StepStatus::Blocked => self.blocked += 1,
            StepStatus::NotStarted => self.not_started += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.in_progress + self.blocked + self.not_started
    }

    /// 完成百分比；无步骤时为 0
    pub fn percentage(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.completed as f64 / total as f64 * 100.0,
        }
    }
}

pub fn format_plan(plan: &Plan) -> String {
    let counts = StatusCounts::of(plan);
    let header = format!("Plan: {} (ID: {})", plan.title, plan.id);

    let mut out = String::new();
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}\n", "=".repeat(header.chars().count()));
    let _ = writeln!(
        out,
        "Progress: {}/{} steps completed ({:.1}%)",
        counts.completed,
        plan.len(),
        counts.percentage()
    );
    let _ = writeln!(
        out,
        "Status: {} completed, {} in progress, {} blocked, {} not started\n",
        counts.completed, counts.in_progress, counts.blocked, counts.not_started
    );
    out.push_str("Steps:\n");

    for (i, step) in plan.steps.iter().enumerate() {
        let _ = writeln!(out, "{}. {} {}", i, plan.status(i).mark(), step);
        let notes = plan.notes(i);
        if !notes.is_empty() {
            let _ = writeln!(out, "   Notes: {}", notes);
        }
    }
    out
}
