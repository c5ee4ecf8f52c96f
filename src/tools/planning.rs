//! Planning 工具：供规划模型创建与维护计划，操作共享的 PlanStore
//!
//! 命令：create / update / list / get / mark_step / delete。
//! 工具实例由所有计划共享，不保存“当前计划”：除 list 外每条命令都必须带 plan_id。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::planning::{format_plan, PlanPatch, PlanStore, StepStatus};
use crate::tools::Tool;

pub const PLANNING_TOOL: &str = "planning";

pub struct PlanningTool {
    store: Arc<PlanStore>,
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn steps_arg(args: &Value, command: &str) -> Result<Option<Vec<String>>, String> {
    let Some(raw) = args.get("steps").filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    raw.as_array()
        .and_then(|items| {
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .map(Some)
        .ok_or_else(|| format!("Parameter `steps` must be a list of strings for command: {}", command))
}

impl PlanningTool {
    pub fn new(store: Arc<PlanStore>) -> Self {
        Self { store }
    }

    fn required_id<'a>(args: &'a Value, command: &str) -> Result<&'a str, String> {
        str_arg(args, "plan_id")
            .ok_or_else(|| format!("Parameter `plan_id` is required for command: {}", command))
    }

    fn create(&self, args: &Value) -> Result<String, String> {
        let id = Self::required_id(args, "create")?;
        let title = str_arg(args, "title")
            .ok_or_else(|| "Parameter `title` is required for command: create".to_string())?;
        let steps = steps_arg(args, "create")?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Parameter `steps` must be a non-empty list of strings for command: create".to_string())?;

        let plan = self
            .store
            .create(id, title, steps)
            .map_err(|e| format!("{}. Use 'update' to modify existing plans.", e))?;
        tracing::info!(plan_id = %id, steps = plan.len(), "plan created by planning tool");
        Ok(format!(
            "Plan created successfully with ID: {}\n\n{}",
            id,
            format_plan(&plan)
        ))
    }

    fn update(&self, args: &Value) -> Result<String, String> {
        let id = Self::required_id(args, "update")?;
        let patch = PlanPatch {
            title: str_arg(args, "title").map(str::to_string),
            steps: steps_arg(args, "update")?,
        };
        let plan = self.store.update(id, patch).map_err(|e| e.to_string())?;
        Ok(format!("Plan updated successfully: {}\n\n{}", id, format_plan(&plan)))
    }

    fn list(&self) -> String {
        let plans = self.store.list();
        if plans.is_empty() {
            return "No plans available. Create a plan with the 'create' command.".to_string();
        }
        let mut out = String::from("Available plans:\n");
        for p in plans {
            out.push_str(&format!(
                "• {}: {} - {}/{} steps completed\n",
                p.id, p.title, p.completed, p.total
            ));
        }
        out
    }

    fn get(&self, args: &Value) -> Result<String, String> {
        let id = Self::required_id(args, "get")?;
        let plan = self.store.get(id).map_err(|e| e.to_string())?;
        Ok(format_plan(&plan))
    }

    fn mark_step(&self, args: &Value) -> Result<String, String> {
        let id = Self::required_id(args, "mark_step")?;
        let index = match args.get("step_index").filter(|v| !v.is_null()) {
            None => return Err("Parameter `step_index` is required for command: mark_step".to_string()),
            Some(v) => v
                .as_u64()
                .map(|i| i as usize)
                .ok_or_else(|| format!("Invalid step_index: {}", v))?,
        };
        let status = str_arg(args, "step_status")
            .map(|s| s.parse::<StepStatus>())
            .transpose()
            .map_err(|e| e.to_string())?;
        let notes = args
            .get("step_notes")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let plan = self
            .store
            .mark_step(id, index, status, notes)
            .map_err(|e| e.to_string())?;
        tracing::info!(plan_id = %id, step = index, "step marked by planning tool");
        Ok(format!(
            "Step {} updated in plan '{}'.\n\n{}",
            index,
            id,
            format_plan(&plan)
        ))
    }

    fn delete(&self, args: &Value) -> Result<String, String> {
        let id = Self::required_id(args, "delete")?;
        self.store.delete(id).map_err(|e| e.to_string())?;
        Ok(format!("Plan '{}' has been deleted.", id))
    }
}

#[async_trait]
impl Tool for PlanningTool {
    fn name(&self) -> &str {
        PLANNING_TOOL
    }

    fn description(&self) -> &str {
        "A planning tool that allows the agent to create and manage plans for solving complex tasks. \
         Provides functionality for creating plans, updating plan steps, and tracking progress."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["create", "update", "list", "get", "mark_step", "delete"],
                    "description": "The command to execute"
                },
                "plan_id": {
                    "type": "string",
                    "description": "Unique identifier for the plan. Required for every command except list."
                },
                "title": {
                    "type": "string",
                    "description": "Title for the plan. Required for create."
                },
                "steps": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "List of plan steps, each starting with [AGENT_NAME]. Required for create."
                },
                "step_index": {
                    "type": "integer",
                    "description": "Index of the step to update (0-based). Required for mark_step."
                },
                "step_status": {
                    "type": "string",
                    "enum": ["not_started", "in_progress", "completed", "blocked"],
                    "description": "Status to set for a step. Used with mark_step."
                },
                "step_notes": {
                    "type": "string",
                    "description": "Additional notes for a step. Optional for mark_step."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let command = str_arg(&args, "command").unwrap_or("");
        match command {
            "create" => self.create(&args),
            "update" => self.update(&args),
            "list" => Ok(self.list()),
            "get" => self.get(&args),
            "mark_step" => self.mark_step(&args),
            "delete" => self.delete(&args),
            other => Err(format!(
                "Unrecognized command: {}. Allowed commands are: create, update, list, get, mark_step, delete",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tool() -> (Arc<PlanStore>, PlanningTool) {
        let store = Arc::new(PlanStore::default());
        (store.clone(), PlanningTool::new(store))
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let (store, tool) = tool();
        let out = tool
            .execute(json!({
                "command": "create",
                "plan_id": "p1",
                "title": "Trip",
                "steps": ["[MANUS] a", "[MANUS] b"]
            }))
            .await
            .unwrap();
        assert!(out.starts_with("Plan created successfully with ID: p1"));
        assert_eq!(store.get("p1").unwrap().len(), 2);

        let again = tool
            .execute(json!({"command": "create", "plan_id": "p1", "title": "x", "steps": ["a"]}))
            .await
            .unwrap_err();
        assert!(again.contains("already exists"));
    }

    #[tokio::test]
    async fn test_parameter_validation() {
        let (_, tool) = tool();
        let err = tool
            .execute(json!({"command": "create", "title": "t", "steps": ["a"]}))
            .await
            .unwrap_err();
        assert_eq!(err, "Parameter `plan_id` is required for command: create");

        let err = tool
            .execute(json!({"command": "create", "plan_id": "p", "title": "t", "steps": []}))
            .await
            .unwrap_err();
        assert!(err.contains("non-empty list"));

        let err = tool.execute(json!({"command": "get"})).await.unwrap_err();
        assert_eq!(err, "Parameter `plan_id` is required for command: get");

        let err = tool.execute(json!({"command": "fly"})).await.unwrap_err();
        assert!(err.starts_with("Unrecognized command: fly"));
    }

    #[tokio::test]
    async fn test_mark_step() {
        let (store, tool) = tool();
        tool.execute(json!({"command": "create", "plan_id": "p", "title": "t", "steps": ["a", "b"]}))
            .await
            .unwrap();

        tool.execute(json!({
            "command": "mark_step",
            "plan_id": "p",
            "step_index": 1,
            "step_status": "completed",
            "step_notes": "ok"
        }))
        .await
        .unwrap();
        let plan = store.get("p").unwrap();
        assert_eq!(plan.status(1), StepStatus::Completed);
        assert_eq!(plan.notes(1), "ok");

        let err = tool
            .execute(json!({"command": "mark_step", "plan_id": "p", "step_index": 0, "step_status": "done"}))
            .await
            .unwrap_err();
        assert!(err.contains("Invalid step_status"));

        let err = tool
            .execute(json!({"command": "mark_step", "plan_id": "p", "step_index": 9}))
            .await
            .unwrap_err();
        assert!(err.contains("Invalid step_index: 9"));
    }

    #[tokio::test]
    async fn test_commands_never_fall_back_to_another_plan() {
        let (store, tool) = tool();
        for id in ["plan_a", "plan_b"] {
            tool.execute(json!({"command": "create", "plan_id": id, "title": id, "steps": ["a"]}))
                .await
                .unwrap();
        }

        // plan_b 最后创建，但省略 plan_id 的命令不会落到它上面
        let err = tool
            .execute(json!({"command": "mark_step", "step_index": 0, "step_status": "completed"}))
            .await
            .unwrap_err();
        assert_eq!(err, "Parameter `plan_id` is required for command: mark_step");
        assert_eq!(store.get("plan_a").unwrap().status(0), StepStatus::NotStarted);
        assert_eq!(store.get("plan_b").unwrap().status(0), StepStatus::NotStarted);

        let err = tool
            .execute(json!({"command": "set_active", "plan_id": "plan_a"}))
            .await
            .unwrap_err();
        assert!(err.starts_with("Unrecognized command: set_active"));
    }

    #[tokio::test]
    async fn test_list_update_delete() {
        let (store, tool) = tool();
        assert!(tool.execute(json!({"command": "list"})).await.unwrap().starts_with("No plans"));

        tool.execute(json!({"command": "create", "plan_id": "p", "title": "t", "steps": ["a"]}))
            .await
            .unwrap();
        let listing = tool.execute(json!({"command": "list"})).await.unwrap();
        assert!(listing.contains("• p: t - 0/1 steps completed"));

        tool.execute(json!({"command": "update", "plan_id": "p", "steps": ["a", "b"]}))
            .await
            .unwrap();
        assert_eq!(store.get("p").unwrap().len(), 2);

        let out = tool
            .execute(json!({"command": "delete", "plan_id": "p"}))
            .await
            .unwrap();
        assert_eq!(out, "Plan 'p' has been deleted.");
        assert!(store.is_empty());
    }
}
