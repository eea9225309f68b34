//! Agent 构建器：由配置统一创建 LLM、文件/网页工具注册表、执行器与 Decision Unit
//!
//! 文件模式与网页模式使用同一套构建逻辑，只是绑定的工具集不同（二者不混用）。

use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::react::{DecisionUnit, Explorer};
use crate::tools::{
    LocalTools, ProjectFs, ProjectTreeTool, ReadFileTool, ReadFilesTool, ToolExecutor,
    ToolRegistry, ToolSource,
};

/// 根据环境变量中的 API Key 与 [llm] 配置选择后端；都没有时使用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(OpenAiClient::deepseek(Some(&model)))
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

/// Agent 构建器：持有配置与 LLM
pub struct AgentBuilder {
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
}

impl AgentBuilder {
    /// 从配置创建（按配置选择 LLM）
    pub fn new(config: AppConfig) -> Self {
        let llm = create_llm_from_config(&config);
        Self { config, llm }
    }

    /// 使用指定 LLM（测试或宿主自带客户端）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = llm;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn llm(&self) -> Arc<dyn LlmClient> {
        self.llm.clone()
    }

    /// 绑定到项目目录的文件沙箱
    pub fn project_fs(&self, project_path: &Path) -> ProjectFs {
        ProjectFs::new(project_path)
            .with_excluded_suffixes(self.config.tools.excluded_suffixes.clone())
            .with_ignore_patterns(&self.config.tools.ignore_patterns)
            .with_max_file_chars(self.config.tools.max_file_chars)
    }

    /// 文件模式工具：read_file / read_files / project_tree
    pub fn file_tools(&self, fs: &ProjectFs) -> Result<LocalTools, AgentError> {
        LocalTools::new()
            .with(ReadFileTool::new(fs.clone()))?
            .with(ReadFilesTool::new(fs.clone()))?
            .with(ProjectTreeTool::new(fs.clone()))
    }

    /// 由一个工具来源构建执行器（批处理策略取自配置）
    pub fn build_executor(
        &self,
        source: impl ToolSource + 'static,
    ) -> Result<ToolExecutor, AgentError> {
        let registry = ToolRegistry::new().with_source(source)?;
        Ok(ToolExecutor::new(registry).with_policy(self.config.tools.batch_policy))
    }

    /// Decision Unit 绑定到执行器的工具清单
    pub fn build_decision_unit(&self, executor: &ToolExecutor) -> DecisionUnit {
        DecisionUnit::new(self.llm.clone(), executor.specs())
    }

    pub fn build_explorer(&self, fs: ProjectFs) -> Explorer {
        Explorer::new(self.llm.clone(), fs)
            .with_max_reflection_rounds(self.config.explore.max_reflection_rounds)
    }
}
