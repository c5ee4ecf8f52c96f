//! 计划存储：plan_id → Plan 的有界 LRU 缓存
//!
//! 无 TTL，容量满时淘汰最久未使用的计划；所有操作在同一把互斥锁内完成，
//! modify 提供原子的读-改-写（认领与完成步骤都走这里）。

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::core::AgentError;
use crate::planning::{Plan, PlanPatch, StepStatus};

pub const DEFAULT_CAPACITY: usize = 1000;

/// list() 返回的计划摘要
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSummary {
    pub id: String,
    pub title: String,
    pub completed: usize,
    pub total: usize,
}

pub struct PlanStore {
    cache: Mutex<LruCache<String, Plan>>,
}

impl Default for PlanStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PlanStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn not_found(id: &str) -> AgentError {
        AgentError::NotFound(format!("No plan found with ID: {}", id))
    }

    pub fn create(&self, id: &str, title: &str, steps: Vec<String>) -> Result<Plan, AgentError> {
        let mut cache = self.cache.lock();
        if cache.contains(id) {
            return Err(AgentError::AlreadyExists(format!(
                "A plan with ID '{}' already exists",
                id
            )));
        }
        let plan = Plan::new(id, title, steps);
        cache.put(id.to_string(), plan.clone());
        tracing::debug!(plan_id = %id, steps = plan.len(), "plan stored");
        Ok(plan)
    }

    pub fn get(&self, id: &str) -> Result<Plan, AgentError> {
        self.cache
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    pub fn update(&self, id: &str, patch: PlanPatch) -> Result<Plan, AgentError> {
        self.modify(id, |plan| {
            plan.apply(patch);
            Ok(plan.clone())
        })
    }

    pub fn delete(&self, id: &str) -> Result<Plan, AgentError> {
        self.cache.lock().pop(id).ok_or_else(|| Self::not_found(id))
    }

    /// 设置单个步骤的状态与备注（None 表示保持不变）；显式设置状态会清零连续失败计数
    pub fn mark_step(
        &self,
        id: &str,
        index: usize,
        status: Option<StepStatus>,
        notes: Option<String>,
    ) -> Result<Plan, AgentError> {
        self.modify(id, |plan| {
            if index >= plan.len() {
                return Err(AgentError::InvalidState(format!(
                    "Invalid step_index: {}. Valid indices range from 0 to {}.",
                    index,
                    plan.len() as i64 - 1
                )));
            }
            if let Some(status) = status {
                plan.set_status(index, status);
                plan.reset_attempts(index);
            }
            if let Some(notes) = notes {
                plan.set_notes(index, notes);
            }
            Ok(plan.clone())
        })
    }

    /// 整体写回（覆盖同 id 的计划）
    pub fn put(&self, plan: Plan) {
        self.cache.lock().put(plan.id.clone(), plan);
    }

    /// 在锁内对计划做读-改-写；闭包返回 Err 时计划仍保留闭包已做的修改
    pub fn modify<T, F>(&self, id: &str, f: F) -> Result<T, AgentError>
    where
        F: FnOnce(&mut Plan) -> Result<T, AgentError>,
    {
        let mut cache = self.cache.lock();
        let plan = cache.get_mut(id).ok_or_else(|| Self::not_found(id))?;
        f(plan)
    }

    pub fn list(&self) -> Vec<PlanSummary> {
        self.cache
            .lock()
            .iter()
            .map(|(id, plan)| PlanSummary {
                id: id.clone(),
                title: plan.title.clone(),
                completed: plan.completed_count(),
                total: plan.len(),
            })
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cache.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.lock().cap().get()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn steps(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_create_get_delete() {
        let store = PlanStore::default();
        store.create("p1", "Title", steps(&["a", "b"])).unwrap();
        assert!(matches!(
            store.create("p1", "Again", vec![]),
            Err(AgentError::AlreadyExists(_))
        ));

        let plan = store.get("p1").unwrap();
        assert_eq!(plan.title, "Title");
        assert_eq!(plan.step_statuses, vec![StepStatus::NotStarted; 2]);

        store.delete("p1").unwrap();
        assert!(matches!(store.get("p1"), Err(AgentError::NotFound(_))));
        assert!(matches!(store.delete("p1"), Err(AgentError::NotFound(_))));
    }

    #[test]
    fn test_update_missing_plan() {
        let store = PlanStore::default();
        assert!(matches!(
            store.update("nope", PlanPatch::title("x")),
            Err(AgentError::NotFound(_))
        ));
    }

    #[test]
    fn test_mark_step_range_checked() {
        let store = PlanStore::default();
        store.create("p", "t", steps(&["a"])).unwrap();
        let plan = store
            .mark_step("p", 0, Some(StepStatus::Completed), Some("ok".into()))
            .unwrap();
        assert_eq!(plan.status(0), StepStatus::Completed);
        assert_eq!(plan.notes(0), "ok");
        assert!(matches!(
            store.mark_step("p", 1, Some(StepStatus::Blocked), None),
            Err(AgentError::InvalidState(_))
        ));
    }

    #[test]
    fn test_mark_step_status_resets_failures() {
        let store = PlanStore::default();
        store.create("p", "t", steps(&["a"])).unwrap();
        store
            .modify("p", |plan| {
                plan.record_failure(0);
                plan.record_failure(0);
                Ok(())
            })
            .unwrap();

        let plan = store.mark_step("p", 0, None, Some("note only".into())).unwrap();
        assert_eq!(plan.attempts(0), 2);

        let plan = store
            .mark_step("p", 0, Some(StepStatus::NotStarted), None)
            .unwrap();
        assert_eq!(plan.attempts(0), 0);
    }

    #[test]
    fn test_lru_eviction() {
        let store = PlanStore::new(2);
        store.create("a", "", vec![]).unwrap();
        store.create("b", "", vec![]).unwrap();
        // 访问 a，使 b 成为最久未使用
        store.get("a").unwrap();
        store.create("c", "", vec![]).unwrap();
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_list_reports_progress() {
        let store = PlanStore::default();
        store.create("p", "Trip", steps(&["a", "b"])).unwrap();
        store.mark_step("p", 1, Some(StepStatus::Completed), None).unwrap();
        let summaries = store.list();
        assert_eq!(
            summaries,
            vec![PlanSummary {
                id: "p".into(),
                title: "Trip".into(),
                completed: 1,
                total: 2
            }]
        );
    }

    #[tokio::test]
    async fn test_concurrent_access_across_plans() {
        let store = Arc::new(PlanStore::default());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let id = format!("plan_{}", i);
                store.create(&id, "t", steps(&["a", "b", "c"])).unwrap();
                for idx in 0..3 {
                    store
                        .mark_step(&id, idx, Some(StepStatus::Completed), None)
                        .unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len(), 16);
        assert!(store.list().iter().all(|s| s.completed == 3));
    }
}
