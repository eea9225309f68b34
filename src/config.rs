//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STEPWISE__*` 覆盖（双下划线表示嵌套，如 `STEPWISE__TOOLS__BATCH_POLICY=isolated`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::react::DEFAULT_MAX_ITERATIONS;
use crate::tools::BatchPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub explore: ExploreSection,
    pub browser: BrowserSection,
}

/// [app] 段：工作目录、迭代上限、中间产物目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 文件模式下的默认项目目录（命令行未指定时使用）
    pub workspace_root: Option<PathBuf>,
    /// Decision Unit 轮次上限，超过即 RunBudgetExceeded
    pub max_iterations: usize,
    /// 设置后写出 context.txt / plan.md / answer.md
    pub artifacts_dir: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            artifacts_dir: None,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub deepseek: LlmDeepSeekSection,
    pub openai: LlmOpenAiSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

/// [tools] 段：批处理策略与文件工具限制
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub batch_policy: BatchPolicy,
    /// 单个文件读取的最大字符数，超出截断
    pub max_file_chars: usize,
    /// 拒绝读取的文件后缀
    pub excluded_suffixes: Vec<String>,
    /// 项目树忽略的文件/目录名（glob）
    pub ignore_patterns: Vec<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            batch_policy: BatchPolicy::default(),
            max_file_chars: 20_000,
            excluded_suffixes: vec![".env".to_string()],
            ignore_patterns: vec![
                "target".to_string(),
                "node_modules".to_string(),
                "__pycache__".to_string(),
            ],
        }
    }
}

/// [explore] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExploreSection {
    pub max_reflection_rounds: usize,
}

impl Default for ExploreSection {
    fn default() -> Self {
        Self {
            max_reflection_rounds: crate::react::explore::DEFAULT_REFLECTION_ROUNDS,
        }
    }
}

/// [browser] 段：网页模式
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub start_url: String,
    pub headless: bool,
    /// 页面正文最大字符数
    pub max_content_chars: usize,
    pub navigation_timeout_secs: u64,
    /// 每类可交互元素最多列出的个数
    pub max_listed_elements: usize,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            start_url: "https://duckduckgo.com/".to_string(),
            headless: true,
            max_content_chars: 6000,
            navigation_timeout_secs: 60,
            max_listed_elements: 10,
        }
    }
}

/// 从 config 目录加载配置，环境变量 STEPWISE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 STEPWISE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STEPWISE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_iterations, 250);
        assert_eq!(cfg.tools.batch_policy, BatchPolicy::Atomic);
        assert_eq!(cfg.explore.max_reflection_rounds, 3);
        assert_eq!(cfg.browser.start_url, "https://duckduckgo.com/");
        assert_eq!(cfg.browser.max_content_chars, 6000);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[app]\nmax_iterations = 12\n\n[tools]\nbatch_policy = \"isolated\"\n\n[browser]\nheadless = false\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.app.max_iterations, 12);
        assert_eq!(cfg.tools.batch_policy, BatchPolicy::Isolated);
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.tools.excluded_suffixes, vec![".env".to_string()]);
    }
}
