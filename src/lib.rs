//! Stepwise - LLM 驱动的分步计划执行智能体
//!
//! 模块划分：
//! - **agent**: 无头任务流水线（文件模式 / 网页模式）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、运行状态、组件构建
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与结构化输出
//! - **memory**: 模型消息格式与只追加的对话日志
//! - **observability**: 日志初始化
//! - **react**: 计划分段、Decision Unit、Continuation Router、分步执行主循环、探索阶段
//! - **tools**: 工具注册表、执行器、文件工具与浏览器工具

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::{AgentError, RunFailure, RunState};
pub use crate::react::{run_plan, StepRunner, StepSession};
