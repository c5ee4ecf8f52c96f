//! 工具层：Tool trait 与注册表、带超时与审计的执行器、planning / summary 内置工具

pub mod executor;
pub mod planning;
pub mod registry;
pub mod summary;

pub use executor::{ToolExecutor, ToolInvoker};
pub use planning::{PlanningTool, PLANNING_TOOL};
pub use registry::{Tool, ToolRegistry};
pub use summary::{SummaryTool, SUMMARY_TOOL};
