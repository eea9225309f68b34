//! Continuation Router：根据最后一条日志与步骤进度决定下一步
//!
//! 纯函数，无副作用。工具调用总是优先：带工具调用意图的回复即使出现在最后一步也不会被当作完成。

use serde::Serialize;

use crate::memory::ConversationEntry;

/// 路由结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// 执行最后一条 AssistantTurn 中的工具调用
    Act,
    /// 当前步骤完成，进入下一步
    Advance,
    /// 全部步骤完成
    Done,
}

pub fn route(last: &ConversationEntry, current_step_index: usize, steps_len: usize) -> Transition {
    if !last.tool_call_intents().is_empty() {
        Transition::Act
    } else if current_step_index + 1 < steps_len {
        Transition::Advance
    } else {
        Transition::Done
    }
}
