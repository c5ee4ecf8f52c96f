//! 核心编排层：错误与恢复、运行状态、按会话加锁、编排器与构建器

pub mod builder;
pub mod error;
pub mod keyed_lock;
pub mod orchestrator;
pub mod recovery;
pub mod state;

pub use builder::{create_builder, create_llm_from_config, OrchestratorBuilder};
pub use error::{AgentError, RecoveryAction};
pub use keyed_lock::SessionLocks;
pub use orchestrator::{
    step_tag, AgentRegistry, PlanningOrchestrator, StepInfo, DEFAULT_AGENT,
    DEFAULT_MAX_STEP_ATTEMPTS,
};
pub use recovery::RecoveryEngine;
pub use state::{AgentSession, AgentStatus, StopReason};
