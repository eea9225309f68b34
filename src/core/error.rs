//! Agent 错误类型
//!
//! 计划执行过程中的致命错误一律向上传播：编排器不做自动重试。
//! 工具内部的普通失败（选择器不存在、导航超时等）不属于这里，而是以文本 Observation 返回给模型。

use thiserror::Error;

use crate::core::RunState;

/// 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 分段结果为空（或计划文本为空），循环开始前即终止
    #[error("Plan produced no steps")]
    EmptyPlan,

    /// 模型请求了两个注册表中都不存在的工具
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Step Advancer 的断言失败：Router 与 Advancer 的不变量被破坏
    #[error("Step index {index} out of range ({len} steps)")]
    StepIndexOutOfRange { index: usize, len: usize },

    /// 达到迭代上限
    #[error("Run budget exceeded after {limit} iterations")]
    RunBudgetExceeded { limit: usize },

    /// 模型协作方失败（网络、结构化输出格式错误、Schema 不符）
    #[error("Decision unit error: {0}")]
    DecisionUnit(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    /// 本地与远程注册表中出现同名工具
    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::Io(e.to_string())
    }
}

/// 致命错误 + 失败时刻的运行状态，调用方据此诊断或续跑
#[derive(Error, Debug)]
#[error("{error}")]
pub struct RunFailure {
    pub error: AgentError,
    pub state: Box<RunState>,
}

impl RunFailure {
    pub fn new(error: AgentError, state: RunState) -> Self {
        Self {
            error,
            state: Box::new(state),
        }
    }

    /// 一行摘要：错误 + 失败时所处步骤
    pub fn summary(&self) -> String {
        format!(
            "{} (step {} of {}, {} tool calls recorded)",
            self.error,
            self.state.current_step_index + 1,
            self.state.steps.len(),
            self.state.tool_calls_made
        )
    }
}
