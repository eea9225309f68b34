//! Decision Unit：为当前步骤拼装指令、调用模型、把回复解析为 AssistantTurn
//!
//! 模型以纯文本回复表示当前步骤完成；需要工具时回复 JSON：
//! `{"tool": "read_file", "args": {...}}` 或 `{"tool_calls": [{"tool": ..., "args": ...}, ...]}`（可包在 ```json 中）。
//! 每个解析出的意图分配唯一 id（`call_<uuid>`）。不做重试：模型失败或工具调用 JSON 无法解析都直接返回错误。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::AgentError;
use crate::llm::{json_candidates, strip_reasoning, LlmClient};
use crate::memory::{render_entries, ConversationEntry, Message, ToolCallIntent};
use crate::react::prompts;
use crate::tools::{render_tool_specs, tool_call_schema_json, ToolSpec};

#[derive(Debug, Deserialize)]
struct WireCall {
    tool: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireDecision {
    Batch { tool_calls: Vec<WireCall> },
    Single(WireCall),
}

fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4())
}

fn into_intent(call: WireCall) -> Result<Option<ToolCallIntent>, AgentError> {
    let name = call.tool.trim().to_string();
    if name.is_empty() {
        return Ok(None);
    }
    let arguments = match call.args {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(AgentError::DecisionUnit(format!(
                "arguments for tool '{}' must be a JSON object, got: {}",
                name, other
            )))
        }
    };
    Ok(Some(ToolCallIntent::new(new_call_id(), name, arguments)))
}

/// 解析模型输出为 AssistantTurn
///
/// 不含 JSON，或 JSON 中没有工具调用 → 无意图的纯文本回复；
/// 含 `"tool"` / `"tool_calls"` 但无法解析 → DecisionUnit 错误。
pub fn parse_decision(output: &str) -> Result<ConversationEntry, AgentError> {
    let body = strip_reasoning(output);

    // 说明文字里可能带有花括号，逐个候选尝试，第一个合法的决策胜出
    let mut parsed = None;
    let mut malformed = None;
    for json in json_candidates(body) {
        match serde_json::from_str::<WireDecision>(json) {
            Ok(d) => {
                parsed = Some((json, d));
                break;
            }
            Err(e) => {
                let mentions_tool = json.contains("\"tool\"") || json.contains("\"tool_calls\"");
                if mentions_tool && malformed.is_none() {
                    malformed = Some(format!("{}: {}", e, json));
                }
            }
        }
    }
    let Some((json, decision)) = parsed else {
        return match malformed {
            Some(e) => Err(AgentError::DecisionUnit(format!("malformed tool call: {}", e))),
            None => Ok(ConversationEntry::assistant(body, Vec::new())),
        };
    };

    let calls = match decision {
        WireDecision::Batch { tool_calls } => tool_calls,
        WireDecision::Single(call) => vec![call],
    };
    let mut intents = Vec::with_capacity(calls.len());
    for call in calls {
        if let Some(intent) = into_intent(call)? {
            intents.push(intent);
        }
    }
    if intents.is_empty() {
        return Ok(ConversationEntry::assistant(body, Vec::new()));
    }

    // JSON 之前的说明文字保留为回复内容
    let lead = body
        .find(json)
        .map(|pos| body[..pos].trim().trim_end_matches("```json").trim())
        .unwrap_or("");
    Ok(ConversationEntry::assistant(lead, intents))
}

/// 一次决策的输入
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub current_step: &'a str,
    /// 之前各步骤的描述（每行 `- ...`），第 0 步为空
    pub previous_steps: &'a str,
    pub plan: &'a str,
    /// 项目结构或页面状态
    pub context: &'a str,
    /// 当前步骤可见的日志窗口
    pub window: &'a [ConversationEntry],
}

/// Decision Unit：持有 LLM 与构造时绑定的工具清单（文件工具或网页工具，二者不混用）
pub struct DecisionUnit {
    llm: Arc<dyn LlmClient>,
    tool_specs: Vec<ToolSpec>,
}

impl DecisionUnit {
    pub fn new(llm: Arc<dyn LlmClient>, tool_specs: Vec<ToolSpec>) -> Self {
        Self { llm, tool_specs }
    }

    pub fn tool_specs(&self) -> &[ToolSpec] {
        &self.tool_specs
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub fn build_instruction(&self, input: &DecisionInput<'_>) -> String {
        let history = render_entries(input.window);
        let tools = render_tool_specs(&self.tool_specs);
        let format = tool_call_schema_json();
        prompts::fill(
            prompts::STEP_DECISION,
            &[
                ("current_step", input.current_step),
                ("previous_steps", input.previous_steps),
                ("plan", input.plan),
                ("context", input.context),
                ("action_history", &history),
                ("tools", &tools),
                ("tool_call_format", &format),
            ],
        )
    }

    /// 调用模型并返回新的 AssistantTurn（由调用方追加到日志）
    pub async fn decide(&self, input: &DecisionInput<'_>) -> Result<ConversationEntry, AgentError> {
        let instruction = self.build_instruction(input);
        tracing::debug!(chars = instruction.len(), window = input.window.len(), "decision prompt");
        let output = self
            .llm
            .complete(&[Message::user(instruction)])
            .await
            .map_err(AgentError::DecisionUnit)?;
        parse_decision(&output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_plain_text_is_step_completion() {
        let entry = parse_decision("The config has been read.").unwrap();
        assert!(entry.tool_call_intents().is_empty());
        assert_eq!(entry.content(), "The config has been read.");
    }

    #[test]
    fn test_single_fenced_call() {
        let entry = parse_decision(
            "Let me look.\n```json\n{\"tool\": \"read_file\", \"args\": {\"path\": \"config.yaml\"}}\n```",
        )
        .unwrap();
        let intents = entry.tool_call_intents();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].name, "read_file");
        assert_eq!(intents[0].arguments["path"], "config.yaml");
        assert!(intents[0].id.starts_with("call_"));
        assert_eq!(entry.content(), "Let me look.");
    }

    #[test]
    fn test_batch_gets_unique_ids_in_order() {
        let entry = parse_decision(
            r#"{"tool_calls": [{"tool": "read_file", "args": {"path": "a"}}, {"tool": "project_tree"}]}"#,
        )
        .unwrap();
        let intents = entry.tool_call_intents();
        assert_eq!(intents.len(), 2);
        assert_eq!(intents[0].name, "read_file");
        assert_eq!(intents[1].name, "project_tree");
        assert!(intents[1].arguments.is_empty());
        assert_ne!(intents[0].id, intents[1].id);
    }

    #[test]
    fn test_reasoning_is_stripped() {
        let entry = parse_decision("<think>{\"tool\": \"x\"}</think>All done.").unwrap();
        assert!(entry.tool_call_intents().is_empty());
        assert_eq!(entry.content(), "All done.");
    }

    #[test]
    fn test_malformed_tool_call_is_error() {
        let err = parse_decision("{\"tool\": \"read_file\", \"args\": {\"path\": }").unwrap_err();
        assert!(matches!(err, AgentError::DecisionUnit(_)));

        let err = parse_decision("{\"tool\": \"read_file\", \"args\": [1, 2]}").unwrap_err();
        assert!(matches!(err, AgentError::DecisionUnit(_)));
    }

    #[test]
    fn test_braces_in_prose_before_tool_call() {
        let entry = parse_decision(
            r#"Editing {version}: {"tool": "read_file", "args": {"path": "config.yaml"}}"#,
        )
        .unwrap();
        let intents = entry.tool_call_intents();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].name, "read_file");
        assert_eq!(intents[0].arguments["path"], "config.yaml");
        assert_eq!(entry.content(), "Editing {version}:");

        // 说明中的花括号本身不构成错误
        let entry = parse_decision("Replaced {old} with {new}.").unwrap();
        assert!(entry.tool_call_intents().is_empty());
    }

    #[test]
    fn test_json_without_tool_is_plain_reply() {
        let entry = parse_decision("Version is now {\"version\": \"1.1.0\"}").unwrap();
        assert!(entry.tool_call_intents().is_empty());
        let entry = parse_decision("{\"tool\": \"\"}").unwrap();
        assert!(entry.tool_call_intents().is_empty());
    }

    #[tokio::test]
    async fn test_decide_formats_step_and_window() {
        let mock = Arc::new(MockLlmClient::scripted(["Step finished."]));
        let unit = DecisionUnit::new(
            mock.clone(),
            vec![ToolSpec {
                name: "read_file".to_string(),
                description: "Read one file".to_string(),
                parameters: crate::tools::schema::empty_args_schema(),
            }],
        );
        let window = vec![ConversationEntry::tool_result("call_9", "version: 1.0.0")];
        let input = DecisionInput {
            current_step: "Update version number",
            previous_steps: "- Read config file",
            plan: "bump it",
            context: "config.yaml",
            window: &window,
        };
        let entry = unit.decide(&input).await.unwrap();
        assert_eq!(entry.content(), "Step finished.");

        let prompt = &mock.prompts()[0];
        assert!(prompt.contains("Update version number"));
        assert!(prompt.contains("- Read config file"));
        assert!(prompt.contains("[tool call_9] version: 1.0.0"));
        assert!(prompt.contains("read_file"));
    }

    #[tokio::test]
    async fn test_decide_propagates_model_failure() {
        let mock = MockLlmClient::new();
        mock.push_error("connection reset");
        let unit = DecisionUnit::new(Arc::new(mock), Vec::new());
        let input = DecisionInput {
            current_step: "s",
            previous_steps: "",
            plan: "p",
            context: "",
            window: &[],
        };
        let err = unit.decide(&input).await.unwrap_err();
        assert!(matches!(err, AgentError::DecisionUnit(msg) if msg == "connection reset"));
    }
}
