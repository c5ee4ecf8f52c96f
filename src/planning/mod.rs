//! 计划层：数据模型、状态机、LRU 存储与文本渲染

pub mod plan;
pub mod render;
pub mod status;
pub mod store;

pub use plan::{generate_plan_id, Plan, PlanPatch};
pub use render::{format_plan, StatusCounts};
pub use status::StepStatus;
pub use store::{PlanStore, PlanSummary};
