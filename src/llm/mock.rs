//! Mock LLM 客户端（用于测试与无 API Key 时的本地运行）
//!
//! 按顺序回放预设回复；脚本耗尽后回显最后一条消息的开头（纯文本，不含工具调用）。
//! 每次调用的 prompt 都会被记录，便于测试断言模型「看到」了什么。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::Message;

const ECHO_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以一组成功回复构造
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::default();
        for reply in replies {
            mock.push_reply(reply);
        }
        mock
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(reply.into()));
        }
    }

    /// 追加一次失败（模拟网络错误等）
    pub fn push_error(&self, error: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error.into()));
        }
    }

    /// 已收到的 prompt（每次调用的消息内容以换行拼接）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let prompt = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt);
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(reply) => reply,
            None => {
                let last = messages
                    .last()
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                let preview: String = last.chars().take(ECHO_PREVIEW_CHARS).collect();
                Ok(format!("Mock reply: {}", preview))
            }
        }
    }
}
