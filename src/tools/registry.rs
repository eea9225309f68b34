//! 工具注册表
//!
//! 两类工具：同步的本地工具（LocalTool，文件读取等）与异步的远程工具（Tool，浏览器操作等），
//! 分别由 LocalTools / RemoteTools 持有。二者都实现 ToolSource，ToolRegistry 把若干 ToolSource
//! 统一在一个能力契约（按名调用，得到文本 Observation）之下，执行器无需关心工具来自哪里。
//!
//! 工具的普通失败不会变成错误：一律折叠为 `"Error: ..."` 文本返回给模型。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::schema::{empty_args_schema, ToolSpec};

/// 异步工具：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value {
        empty_args_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 同步工具：在阻塞线程池中调用
pub trait LocalTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value {
        empty_args_schema()
    }

    fn invoke(&self, args: &Value) -> Result<String, String>;
}

/// 统一能力契约：一个可按名调用工具的来源
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// 来源标识（写入审计日志）
    fn kind(&self) -> &'static str;

    fn contains(&self, name: &str) -> bool;

    fn tool_names(&self) -> Vec<String>;

    fn specs(&self) -> Vec<ToolSpec>;

    /// 调用工具；名称不存在时返回 UnknownTool，工具自身失败折叠进 Observation
    async fn invoke(&self, name: &str, args: Value) -> Result<String, AgentError>;
}

fn failure_observation(e: impl std::fmt::Display) -> String {
    format!("Error: {}", e)
}

/// 本地（同步）工具集合
#[derive(Default, Clone)]
pub struct LocalTools {
    tools: BTreeMap<String, Arc<dyn LocalTool>>,
}

impl LocalTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具已存在时拒绝
    pub fn register(&mut self, tool: impl LocalTool + 'static) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    pub fn with(mut self, tool: impl LocalTool + 'static) -> Result<Self, AgentError> {
        self.register(tool)?;
        Ok(self)
    }
}

#[async_trait]
impl ToolSource for LocalTools {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<String, AgentError> {
        let tool = self
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        let joined = tokio::task::spawn_blocking(move || tool.invoke(&args)).await;
        Ok(match joined {
            Ok(Ok(observation)) => observation,
            Ok(Err(e)) => failure_observation(e),
            Err(e) => failure_observation(format!("tool {} aborted: {}", name, e)),
        })
    }
}

/// 远程（异步）工具集合
#[derive(Default, Clone)]
pub struct RemoteTools {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl RemoteTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具已存在时拒绝
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Result<Self, AgentError> {
        self.register(tool)?;
        Ok(self)
    }
}

#[async_trait]
impl ToolSource for RemoteTools {
    fn kind(&self) -> &'static str {
        "remote"
    }

    fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    async fn invoke(&self, name: &str, args: Value) -> Result<String, AgentError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        Ok(match tool.execute(args).await {
            Ok(observation) => observation,
            Err(e) => failure_observation(e),
        })
    }
}

/// 统一注册表：若干 ToolSource 的并集，名称在并集中唯一
#[derive(Default, Clone)]
pub struct ToolRegistry {
    sources: Vec<Arc<dyn ToolSource>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一个来源；与已有工具重名时拒绝
    pub fn add_source(&mut self, source: impl ToolSource + 'static) -> Result<(), AgentError> {
        for name in source.tool_names() {
            if self.contains(&name) {
                return Err(AgentError::DuplicateTool(name));
            }
        }
        self.sources.push(Arc::new(source));
        Ok(())
    }

    pub fn with_source(mut self, source: impl ToolSource + 'static) -> Result<Self, AgentError> {
        self.add_source(source)?;
        Ok(self)
    }

    /// 由本地与远程两个子注册表组成
    pub fn from_parts(local: LocalTools, remote: RemoteTools) -> Result<Self, AgentError> {
        Self::new().with_source(local)?.with_source(remote)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.iter().any(|s| s.contains(name))
    }

    /// 查找持有该工具的来源
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn ToolSource>> {
        self.sources.iter().find(|s| s.contains(name)).cloned()
    }

    pub async fn invoke(&self, name: &str, args: Value) -> Result<String, AgentError> {
        let source = self
            .resolve(name)
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))?;
        source.invoke(name, args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.sources.iter().flat_map(|s| s.tool_names()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.sources.iter().flat_map(|s| s.specs()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl LocalTool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase text. Args: {\"text\": \"...\"}"
        }

        fn invoke(&self, args: &Value) -> Result<String, String> {
            args.get("text")
                .and_then(|v| v.as_str())
                .map(|s| s.to_uppercase())
                .ok_or_else(|| "missing text".to_string())
        }
    }

    struct Flaky;

    #[async_trait]
    impl Tool for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("selector not found".to_string())
        }
    }

    #[tokio::test]
    async fn test_dispatch_across_sources() {
        let registry = ToolRegistry::from_parts(
            LocalTools::new().with(Upper).unwrap(),
            RemoteTools::new().with(Flaky).unwrap(),
        )
        .unwrap();

        let out = registry
            .invoke("upper", serde_json::json!({"text": "abc"}))
            .await
            .unwrap();
        assert_eq!(out, "ABC");

        let out = registry.invoke("flaky", Value::Null).await.unwrap();
        assert_eq!(out, "Error: selector not found");

        let err = registry.invoke("nope", Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_local_failure_becomes_observation() {
        let local = LocalTools::new().with(Upper).unwrap();
        let out = local.invoke("upper", serde_json::json!({})).await.unwrap();
        assert_eq!(out, "Error: missing text");
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ToolRegistry::new()
            .with_source(LocalTools::new().with(Upper).unwrap())
            .unwrap()
            .with_source(LocalTools::new().with(Upper).unwrap())
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "upper"));
    }

    #[test]
    fn test_duplicate_names_rejected_within_source() {
        let err = LocalTools::new().with(Upper).unwrap().with(Upper).err().unwrap();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "upper"));

        let mut remote = RemoteTools::new();
        remote.register(Flaky).unwrap();
        let err = remote.register(Flaky).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateTool(name) if name == "flaky"));
        assert_eq!(remote.tool_names(), vec!["flaky".to_string()]);
    }

    #[test]
    fn test_specs_cover_union() {
        let registry = ToolRegistry::from_parts(
            LocalTools::new().with(Upper).unwrap(),
            RemoteTools::new().with(Flaky).unwrap(),
        )
        .unwrap();
        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["upper".to_string(), "flaky".to_string()]);
        assert!(registry.resolve("flaky").map(|s| s.kind()) == Some("remote"));
    }
}
