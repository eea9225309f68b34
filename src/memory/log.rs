//! 对话日志：运行期间「发生了什么」的唯一事实来源
//!
//! 只追加、不删除、不重排。Decision Unit 读取按步骤截取的窗口，Tool Executor 与编排器负责追加。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 模型发出的一次工具调用意图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallIntent {
    /// 每个意图唯一，由 Decision Unit 分配
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCallIntent {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// 参数的紧凑 JSON 文本（用于 Action History 与日志）
    pub fn arguments_text(&self) -> String {
        Value::Object(self.arguments.clone()).to_string()
    }
}

/// 日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEntry {
    UserTurn {
        content: String,
    },
    AssistantTurn {
        content: String,
        tool_call_intents: Vec<ToolCallIntent>,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
    },
}

impl ConversationEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self::UserTurn {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>, tool_call_intents: Vec<ToolCallIntent>) -> Self {
        Self::AssistantTurn {
            content: content.into(),
            tool_call_intents,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    /// 仅 AssistantTurn 可能携带工具调用；其余条目返回空 slice
    pub fn tool_call_intents(&self) -> &[ToolCallIntent] {
        match self {
            Self::AssistantTurn {
                tool_call_intents, ..
            } => tool_call_intents,
            _ => &[],
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::UserTurn { content }
            | Self::AssistantTurn { content, .. }
            | Self::ToolResult { content, .. } => content,
        }
    }
}

impl fmt::Display for ConversationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserTurn { content } => write!(f, "[user] {content}"),
            Self::AssistantTurn {
                content,
                tool_call_intents,
            } => {
                write!(f, "[assistant] {content}")?;
                for intent in tool_call_intents {
                    write!(
                        f,
                        "\n  -> tool call {} {}({})",
                        intent.id,
                        intent.name,
                        intent.arguments_text()
                    )?;
                }
                Ok(())
            }
            Self::ToolResult {
                tool_call_id,
                content,
            } => write!(f, "[tool {tool_call_id}] {content}"),
        }
    }
}

/// 只追加的有序日志
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationLog {
    entries: Vec<ConversationEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置条目（如最初的用户请求）
    pub fn seeded(entries: impl IntoIterator<Item = ConversationEntry>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ConversationEntry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ConversationEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 将一段日志渲染为 prompt 中的文本（每条一行，按顺序）
pub fn render_entries(entries: &[ConversationEntry]) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
