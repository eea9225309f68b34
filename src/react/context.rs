//! 外部上下文：Decision Unit 每轮决策前读取的项目结构或页面状态

use async_trait::async_trait;

use crate::core::AgentError;

/// 外部上下文来源（文件模式为固定的项目结构，网页模式为实时页面内容）
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn current(&self) -> Result<String, AgentError>;
}

/// 固定文本上下文
#[derive(Debug, Clone, Default)]
pub struct StaticContext(pub String);

impl StaticContext {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

#[async_trait]
impl ContextProvider for StaticContext {
    async fn current(&self) -> Result<String, AgentError> {
        Ok(self.0.clone())
    }
}
