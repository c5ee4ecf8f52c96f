//! Summary 工具：记录当前步骤的结论，调用后该 agent 的本次 run 在当前轮结束

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

pub const SUMMARY_TOOL: &str = "summary";

pub struct SummaryTool;

#[async_trait]
impl Tool for SummaryTool {
    fn name(&self) -> &str {
        SUMMARY_TOOL
    }

    fn description(&self) -> &str {
        "Record the result of the current step and finish it. Call this once the step is done."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Summary of what was done and the outcome"
                }
            },
            "required": ["summary"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        args.get("summary")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| "Parameter `summary` is required".to_string())
    }
}
