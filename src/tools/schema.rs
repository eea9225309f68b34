//! 工具 Schema：绑定到 Decision Unit 的工具清单与工具调用格式（schemars 自动生成）
//!
//! 工具清单与调用格式都会拼入 prompt，减少模型输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use serde_json::Value;

/// 单个工具的对外描述：名称、用途、参数 JSON Schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 由参数结构体生成参数 Schema
pub fn args_schema<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| empty_args_schema())
}

pub fn empty_args_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// 单个工具调用：`{"tool": "...", "args": {...}}`
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，必须是 Available tools 中的一个
    pub tool: String,
    /// 工具参数，需符合该工具的 parameters schema
    pub args: HashMap<String, Value>,
}

/// 一次发出多个工具调用：`{"tool_calls": [...]}`
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallBatchFormat {
    pub tool_calls: Vec<ToolCallFormat>,
}

/// 工具调用格式的 JSON Schema（单个与批量两种形式）
pub fn tool_call_schema_json() -> String {
    let single = schema_for!(ToolCallFormat);
    let batch = schema_for!(ToolCallBatchFormat);
    let single = serde_json::to_string_pretty(&single).unwrap_or_default();
    let batch = serde_json::to_string_pretty(&batch).unwrap_or_default();
    format!("Single call:\n{}\n\nSeveral calls:\n{}", single, batch)
}

/// 渲染工具清单
pub fn render_tool_specs(specs: &[ToolSpec]) -> String {
    serde_json::to_string_pretty(specs).unwrap_or_else(|_| "[]".to_string())
}
