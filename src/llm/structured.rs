//! 结构化输出：按 schemars 生成的 JSON Schema 约束模型回复，并解析为强类型
//!
//! 用于计划分段（StepList）、文件探索（SearchFilePaths）与反思（FileReflection）。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;

/// 从文本中提取 JSON 对象：优先 ```json 代码块，其次第一个 `{` 到最后一个 `}`
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some(body.trim());
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

/// 文本中所有顶层平衡的 `{...}` 片段（跳过字符串内的括号），按出现顺序
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if depth > 0 && in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    found.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    found
}

/// 候选 JSON 片段：先是 [`extract_json`] 的结果，再是各个平衡对象（靠后的优先）
pub fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates: Vec<&str> = extract_json(text).into_iter().collect();
    for obj in balanced_objects(text.trim()).into_iter().rev() {
        if !candidates.contains(&obj) {
            candidates.push(obj);
        }
    }
    candidates
}

/// 去掉推理模型输出中 `</think>` 之前的思考内容
pub fn strip_reasoning(text: &str) -> &str {
    text.rsplit("</think>").next().unwrap_or(text).trim()
}

/// 生成目标类型的 Schema 说明，附加在 prompt 末尾
pub fn schema_instruction<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!(
        "Respond ONLY with a single JSON object matching this JSON Schema, no prose:\n```json\n{}\n```",
        schema_json
    )
}

/// 调用模型并将回复解析为 T；任一环节失败都视为 Decision Unit 错误
pub async fn complete_structured<T>(llm: &dyn LlmClient, prompt: &str) -> Result<T, AgentError>
where
    T: DeserializeOwned + JsonSchema,
{
    let full_prompt = format!("{}\n\n{}", prompt, schema_instruction::<T>());
    let raw = llm
        .complete(&[Message::user(full_prompt)])
        .await
        .map_err(AgentError::DecisionUnit)?;
    let body = strip_reasoning(&raw);
    let candidates = json_candidates(body);
    let mut first_error = None;
    for json in &candidates {
        match serde_json::from_str(json) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert_with(|| format!("{}: {}", e, json));
            }
        }
    }
    Err(AgentError::DecisionUnit(match first_error {
        Some(e) => format!("structured output rejected: {}", e),
        None => format!("structured output contained no JSON object: {}", body),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Paths {
        file_paths: Vec<String>,
    }

    #[test]
    fn test_extract_json_prefers_fenced_block() {
        let text = "Sure {not this}\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(text), Some("{\"a\": 1}"));
        assert_eq!(extract_json("x {\"b\": 2} y"), Some("{\"b\": 2}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_json_candidates_skip_braces_in_prose() {
        let text = r#"Editing {version}: {"tool": "read_file", "args": {"path": "a}.txt"}}"#;
        let candidates = json_candidates(text);
        assert_eq!(candidates[0], &text[8..]);
        assert!(candidates.contains(&r#"{"tool": "read_file", "args": {"path": "a}.txt"}}"#));
        assert!(candidates.contains(&"{version}"));
        assert!(json_candidates("no json here").is_empty());
    }

    #[tokio::test]
    async fn test_complete_structured_finds_object_after_prose_braces() {
        let mock = MockLlmClient::scripted([r#"Looking at {src}: {"file_paths": ["src/lib.rs"]}"#]);
        let paths: Paths = complete_structured(&mock, "find files").await.unwrap();
        assert_eq!(paths.file_paths, vec!["src/lib.rs".to_string()]);
    }

    #[test]
    fn test_strip_reasoning() {
        assert_eq!(strip_reasoning("<think>hmm</think>\nPlan body"), "Plan body");
        assert_eq!(strip_reasoning("plain"), "plain");
    }

    #[tokio::test]
    async fn test_complete_structured_parses_and_sends_schema() {
        let mock = MockLlmClient::scripted([r#"```json
{"file_paths": ["src/main.rs"]}
```"#]);
        let paths: Paths = complete_structured(&mock, "find files").await.unwrap();
        assert_eq!(paths.file_paths, vec!["src/main.rs".to_string()]);
        assert!(mock.prompts()[0].contains("file_paths"));
    }

    #[tokio::test]
    async fn test_complete_structured_rejects_bad_shape() {
        let mock = MockLlmClient::scripted([r#"{"wrong": true}"#]);
        let err = complete_structured::<Paths>(&mock, "find files")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::DecisionUnit(_)));
    }
}
