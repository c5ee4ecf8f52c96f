//! 按键单飞锁：同一 (agent, plan) 的 run 串行，不同 plan 互不阻塞
//!
//! 每个键对应一把 tokio Mutex，锁内保存该键的 AgentSession。
//! 守卫释放时会话复位为 Idle；若没有其他调用方在等待，该键的槽位随之移除，表不会随计划数增长。

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::core::{AgentSession, AgentStatus};

type Slot = Arc<AsyncMutex<AgentSession>>;

/// 键 -> 会话锁 的注册表
#[derive(Default)]
pub struct SessionLocks {
    sessions: Mutex<HashMap<String, Slot>>,
}

/// 持有某键会话的守卫；drop 时复位为 Idle 并尝试回收槽位
pub struct SessionGuard<'a> {
    guard: OwnedMutexGuard<AgentSession>,
    locks: &'a SessionLocks,
    key: String,
}

impl Deref for SessionGuard<'_> {
    type Target = AgentSession;

    fn deref(&self) -> &AgentSession {
        &self.guard
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut AgentSession {
        &mut self.guard
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.guard.end();
        self.locks.release(&self.key);
    }
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Slot {
        self.sessions
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// 获取键对应的会话；若已有 run 持有，则等待其结束
    pub async fn acquire(&self, key: &str) -> SessionGuard<'_> {
        let guard = self.slot(key).lock_owned().await;
        SessionGuard {
            guard,
            locks: self,
            key: key.to_string(),
        }
    }

    /// 守卫释放前调用：表与当前守卫之外没有别的持有者（无人等待）时移除槽位
    fn release(&self, key: &str) {
        let mut sessions = self.sessions.lock();
        if sessions.get(key).is_some_and(|slot| Arc::strong_count(slot) <= 2) {
            sessions.remove(key);
        }
    }

    /// 观测状态：锁被持有即视为 Running
    pub fn status(&self, key: &str) -> AgentStatus {
        let sessions = self.sessions.lock();
        match sessions.get(key) {
            None => AgentStatus::Idle,
            Some(slot) => match slot.try_lock() {
                Ok(session) => session.status(),
                Err(_) => AgentStatus::Running,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
