//! 卡住检测：最近若干条记忆里模型只说话不调工具的次数达到阈值即视为卡住

use crate::memory::Message;

pub const DEFAULT_WINDOW: usize = 6;
pub const DEFAULT_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckDetector {
    window: usize,
    threshold: usize,
}

impl Default for StuckDetector {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_THRESHOLD)
    }
}

impl StuckDetector {
    pub fn new(window: usize, threshold: usize) -> Self {
        Self { window, threshold }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// 窗口内没有工具调用的 assistant 消息数
    pub fn idle_turns(&self, recent: &[Message]) -> usize {
        let start = recent.len().saturating_sub(self.window);
        recent[start..]
            .iter()
            .filter(|m| m.is_idle_assistant_turn())
            .count()
    }

    /// 阈值为 0 时关闭检测
    pub fn is_stuck(&self, recent: &[Message]) -> bool {
        self.threshold > 0 && self.idle_turns(recent) >= self.threshold
    }
}
