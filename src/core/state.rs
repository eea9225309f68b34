//! 运行状态：一次计划执行从分段到结束所携带的全部数据
//!
//! 失败时同样以 RunState 交还调用方（见 RunFailure），便于诊断或续跑。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::memory::ConversationLog;
use crate::react::{Step, StepOffsetTable};

/// 状态机阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Deciding,
    Acting,
    Advancing,
    Done,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunState {
    pub plan: String,
    pub steps: Vec<Step>,
    pub current_step_index: usize,
    pub offsets: StepOffsetTable,
    pub log: ConversationLog,
    /// 人类可读的审计轨迹，只追加，与结构化日志并行
    pub action_history: String,
    pub phase: RunPhase,
    /// 已完成的 Decision Unit 轮次
    pub iterations: usize,
    pub tool_calls_made: usize,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    /// 分段之前的初始状态
    pub fn new(
        plan: impl Into<String>,
        log: ConversationLog,
        action_history: impl Into<String>,
    ) -> Self {
        Self {
            plan: plan.into(),
            steps: Vec::new(),
            current_step_index: 0,
            offsets: StepOffsetTable::default(),
            log,
            action_history: action_history.into(),
            phase: RunPhase::Deciding,
            iterations: 0,
            tool_calls_made: 0,
            started_at: Utc::now(),
        }
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current_step_index)
    }

    pub fn is_done(&self) -> bool {
        self.phase == RunPhase::Done
    }

    /// 最后一条 AssistantTurn 的文本（通常是最后一步的总结）
    pub fn final_reply(&self) -> Option<&str> {
        self.log.entries().iter().rev().find_map(|e| match e {
            crate::memory::ConversationEntry::AssistantTurn { content, .. } => {
                Some(content.as_str())
            }
            _ => None,
        })
    }
}
