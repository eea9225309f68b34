//! 步骤模型：计划分段、步骤偏移表、按步骤截取日志窗口、步骤推进
//!
//! 偏移表记录「第 i 步开始时日志的长度」；第 i 步的 Decision Unit 只看到 `log[offset[i]..]`，
//! 历史步骤的对话不会重放进当前步骤的上下文。

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::{complete_structured, LlmClient};
use crate::memory::{ConversationEntry, ConversationLog};
use crate::react::prompts;

/// 计划中的一个步骤；创建后不可变，身份即其在序列中的位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    /// 一个自包含的工作单元
    pub description: String,
}

impl Step {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

/// 分段的结构化输出
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct StepList {
    /// 按执行顺序排列的步骤
    pub steps: Vec<Step>,
}

/// 步骤下标 → 该步骤开始时的日志长度
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOffsetTable {
    offsets: BTreeMap<usize, usize>,
}

impl StepOffsetTable {
    /// 第 0 步从当前日志长度开始（已有的预置条目不计入任何步骤之外）
    pub fn start(log_len: usize) -> Self {
        let mut offsets = BTreeMap::new();
        offsets.insert(0, log_len);
        Self { offsets }
    }

    pub fn get(&self, step_index: usize) -> Option<usize> {
        self.offsets.get(&step_index).copied()
    }

    pub fn record(&mut self, step_index: usize, log_len: usize) {
        self.offsets.insert(step_index, log_len);
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// 按步骤下标升序的 (step, offset)
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.offsets.iter().map(|(k, v)| (*k, *v))
    }

    /// 偏移随步骤下标单调不减
    pub fn is_monotonic(&self) -> bool {
        self.offsets
            .values()
            .zip(self.offsets.values().skip(1))
            .all(|(a, b)| a <= b)
    }
}

/// 将计划文本分段为步骤
///
/// 计划为空白时不调用模型，直接返回 EmptyPlan；模型返回的空白描述会被丢弃，丢弃后为空同样是 EmptyPlan。
/// 返回的偏移表中第 0 步的偏移为 `log_len`。
pub async fn segment(
    llm: &dyn LlmClient,
    plan: &str,
    log_len: usize,
) -> Result<(Vec<Step>, StepOffsetTable), AgentError> {
    if plan.trim().is_empty() {
        return Err(AgentError::EmptyPlan);
    }

    let prompt = prompts::fill(prompts::SEGMENT_PLAN, &[("plan", plan)]);
    let list: StepList = complete_structured(llm, &prompt).await?;
    let steps: Vec<Step> = list
        .steps
        .into_iter()
        .filter(|s| !s.description.trim().is_empty())
        .collect();
    if steps.is_empty() {
        return Err(AgentError::EmptyPlan);
    }

    tracing::info!(steps = steps.len(), "plan segmented");
    Ok((steps, StepOffsetTable::start(log_len)))
}

/// 第 `step_index` 步可见的日志窗口：`log[offset..]`
///
/// 偏移表缺少该步骤时退回到完整日志，并记录一条 warn（正常推进下不应发生）。
pub fn window<'a>(
    log: &'a ConversationLog,
    offsets: &StepOffsetTable,
    step_index: usize,
) -> &'a [ConversationEntry] {
    let entries = log.entries();
    let offset = match offsets.get(step_index) {
        Some(offset) => offset,
        None => {
            tracing::warn!(step_index, "no offset recorded for step, using full history");
            0
        }
    };
    entries.get(offset..).unwrap_or(&[])
}

/// 推进到下一步：记录新步骤的起始偏移并返回新下标
pub fn advance(
    current_step_index: usize,
    steps_len: usize,
    log_len: usize,
    offsets: &mut StepOffsetTable,
) -> Result<usize, AgentError> {
    let next = current_step_index + 1;
    if next >= steps_len {
        return Err(AgentError::StepIndexOutOfRange {
            index: next,
            len: steps_len,
        });
    }
    offsets.record(next, log_len);
    Ok(next)
}

/// 当前步骤之前各步骤的描述，每行 `- ...`；第 0 步为空串
pub fn previous_steps_text(steps: &[Step], current_step_index: usize) -> String {
    steps
        .iter()
        .take(current_step_index)
        .map(|s| format!("- {}", s.description))
        .collect::<Vec<_>>()
        .join("\n")
}
