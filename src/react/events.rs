//! 运行过程事件：供宿主展示步骤进度、工具调用与观察

use serde::Serialize;

use crate::react::Transition;

/// 单个运行事件（可序列化为 JSON 推送给前端）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 分段完成
    Segmented { steps: Vec<String> },
    /// 开始执行某一步骤
    StepStarted {
        index: usize,
        total: usize,
        description: String,
    },
    /// 正在调用 Decision Unit
    Deciding { iteration: usize },
    /// 调用工具
    ToolCall {
        id: String,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { id: String, preview: String },
    /// 路由结果
    Routed { transition: Transition },
    /// 全部步骤完成
    Done { iterations: usize },
    /// 错误
    Error { text: String },
}
