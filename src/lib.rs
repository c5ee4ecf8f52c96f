//! Hive - 计划 / 执行编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、运行状态、编排器、构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **memory**: 按会话隔离的对话记忆
//! - **planning**: 计划模型、LRU 存储与渲染
//! - **react**: Agent 运行时与工具调用型 agent
//! - **tools**: 工具注册表、执行器与内置工具

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planning;
pub mod react;
pub mod tools;

pub use crate::core::{OrchestratorBuilder, PlanningOrchestrator};
