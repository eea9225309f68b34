//! 工具执行器
//!
//! 对一批工具调用意图：按策略校验名称 → 并发调度 → 按发出顺序写回 ToolResult 与 Action History。
//! 每次调用输出一条结构化审计日志（JSON）。
//!
//! 批处理策略：
//! - `Atomic`（默认）：先解析整批名称，任一未知即整批失败（UnknownTool），批内不执行、不记录任何调用；
//! - `Isolated`：未知名称只影响该意图，其 ToolResult 为错误文本，其余照常执行。

use std::time::Instant;

use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::memory::{ConversationEntry, ConversationLog, ToolCallIntent};
use crate::tools::{ToolRegistry, ToolSpec};

const ARGS_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    #[default]
    Atomic,
    Isolated,
}

/// 单个意图的执行结果
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub intent: ToolCallIntent,
    pub observation: String,
    /// false 表示名称未解析（仅 Isolated 策略下出现）
    pub dispatched: bool,
}

/// 一批调用的产出：与意图一一对应、顺序一致
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub outcomes: Vec<ToolOutcome>,
}

impl BatchOutcome {
    /// 每个意图一条 ToolResult
    pub fn tool_results(&self) -> Vec<ConversationEntry> {
        self.outcomes
            .iter()
            .map(|o| ConversationEntry::tool_result(o.intent.id.clone(), o.observation.clone()))
            .collect()
    }

    /// 追加到 Action History 的文本
    pub fn history_text(&self) -> String {
        self.outcomes
            .iter()
            .map(|o| action_history_line(&o.intent, &o.observation))
            .collect()
    }

    /// 写回日志与 Action History
    pub fn apply(&self, log: &mut ConversationLog, action_history: &mut String) {
        log.extend(self.tool_results());
        action_history.push_str(&self.history_text());
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Action History 中的一条记录
pub fn action_history_line(intent: &ToolCallIntent, observation: &str) -> String {
    format!(
        "\nTool Call: {}({})\nResult: {}",
        intent.name,
        intent.arguments_text(),
        observation
    )
}

/// 工具执行器：持有注册表与批处理策略
#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
    policy: BatchPolicy,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            policy: BatchPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.registry.specs()
    }

    /// 执行一批意图；结果顺序与 intents 一致
    pub async fn execute(&self, intents: &[ToolCallIntent]) -> Result<BatchOutcome, AgentError> {
        if self.policy == BatchPolicy::Atomic {
            if let Some(unknown) = intents.iter().find(|i| !self.registry.contains(&i.name)) {
                tracing::warn!(tool = %unknown.name, "unknown tool requested, aborting batch");
                return Err(AgentError::UnknownTool(unknown.name.clone()));
            }
        }

        let calls = intents.iter().map(|intent| self.execute_one(intent));
        let outcomes = join_all(calls).await;
        Ok(BatchOutcome { outcomes })
    }

    async fn execute_one(&self, intent: &ToolCallIntent) -> ToolOutcome {
        let start = Instant::now();
        let args = Value::Object(intent.arguments.clone());

        let (observation, dispatched, source_kind) = match self.registry.resolve(&intent.name) {
            Some(source) => {
                let kind = source.kind();
                match source.invoke(&intent.name, args).await {
                    Ok(obs) => (obs, true, kind),
                    // 来源刚刚确认持有该工具，这里只可能是实现不一致
                    Err(e) => (format!("Error: {}", e), true, kind),
                }
            }
            None => (
                format!("Error: unknown tool '{}'", intent.name),
                false,
                "none",
            ),
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": intent.name,
            "tool_call_id": intent.id,
            "source": source_kind,
            "ok": dispatched && !observation.starts_with("Error:"),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&intent.arguments_text()),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        ToolOutcome {
            intent: intent.clone(),
            observation,
            dispatched,
        }
    }
}

fn args_preview(s: &str) -> String {
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}
