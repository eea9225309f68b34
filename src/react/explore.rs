//! 计划之前的阶段：文件探索与反思、上下文构建、输入分类、回答问题、制定计划
//!
//! 反思最多进行 `max_reflection_rounds` 轮；模型失败时保留当前上下文并记录 warn，不中止流程。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::{complete_structured, strip_reasoning, LlmClient};
use crate::memory::Message;
use crate::react::prompts;
use crate::tools::ProjectFs;

/// 默认反思轮数上限
pub const DEFAULT_REFLECTION_ROUNDS: usize = 3;

/// 文件探索的结构化输出
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchFilePaths {
    /// 完成任务所需的文件路径（相对项目根目录）
    pub file_paths: Vec<String>,
}

/// 反思的结构化输出
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FileReflection {
    /// 还需要补充的文件路径；上下文已足够时为空或省略
    #[serde(default)]
    pub additional_file_paths: Option<Vec<String>>,
}

/// 用户输入类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Question,
    Task,
}

/// 探索得到的文件集合与拼接内容
#[derive(Debug, Clone, Default)]
pub struct ExploredContext {
    pub project_structure: String,
    /// 已纳入上下文的文件，按加入顺序
    pub file_paths: Vec<String>,
    /// 文件内容拼接
    pub files: String,
}

/// 文件探索器
pub struct Explorer {
    llm: Arc<dyn LlmClient>,
    fs: ProjectFs,
    max_reflection_rounds: usize,
}

impl Explorer {
    pub fn new(llm: Arc<dyn LlmClient>, fs: ProjectFs) -> Self {
        Self {
            llm,
            fs,
            max_reflection_rounds: DEFAULT_REFLECTION_ROUNDS,
        }
    }

    pub fn with_max_reflection_rounds(mut self, rounds: usize) -> Self {
        self.max_reflection_rounds = rounds;
        self
    }

    pub fn project_fs(&self) -> &ProjectFs {
        &self.fs
    }

    fn project_path(&self) -> String {
        self.fs.root().display().to_string()
    }

    /// 加入新路径（去重并过滤敏感文件），返回实际新增的数量
    fn absorb(&self, explored: &mut ExploredContext, paths: Vec<String>) -> usize {
        let mut added = 0;
        for path in paths {
            let path = path.trim().to_string();
            if path.is_empty()
                || self.fs.is_excluded(&path)
                || explored.file_paths.contains(&path)
            {
                continue;
            }
            explored.file_paths.push(path);
            added += 1;
        }
        added
    }

    /// 由模型挑选相关文件并读取其内容
    pub async fn explore(&self, user_task: &str) -> Result<ExploredContext, AgentError> {
        let project_structure = self.fs.project_tree();
        let project_path = self.project_path();
        let prompt = prompts::fill(
            prompts::FILE_PLANNER,
            &[
                ("user_task", user_task),
                ("project_structure", &project_structure),
                ("project_path", &project_path),
            ],
        );
        tracing::info!("selecting relevant files");
        let found: SearchFilePaths = complete_structured(self.llm.as_ref(), &prompt).await?;

        let mut explored = ExploredContext {
            project_structure,
            ..Default::default()
        };
        self.absorb(&mut explored, found.file_paths);
        explored.files = self.fs.concat_files(&explored.file_paths);
        tracing::info!(files = explored.file_paths.len(), "files selected");
        Ok(explored)
    }

    /// 有界反思：询问是否需要更多文件，直到没有新文件或达到轮数上限
    pub async fn reflect(&self, user_task: &str, mut explored: ExploredContext) -> ExploredContext {
        let project_path = self.project_path();
        for round in 1..=self.max_reflection_rounds {
            let prompt = prompts::fill(
                prompts::FILE_REFLECTION,
                &[
                    ("user_task", user_task),
                    ("project_structure", &explored.project_structure),
                    ("context", &explored.files),
                    ("project_path", &project_path),
                ],
            );
            let reflection: FileReflection =
                match complete_structured(self.llm.as_ref(), &prompt).await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(
                            round,
                            error = %e,
                            "file reflection failed, keeping current context"
                        );
                        break;
                    }
                };
            let Some(additional) = reflection.additional_file_paths else {
                break;
            };
            let added = self.absorb(&mut explored, additional);
            if added == 0 {
                break;
            }
            tracing::info!(round, added, "reflection added files");
            explored.files = self.fs.concat_files(&explored.file_paths);
        }
        explored
    }

    /// 最终上下文：项目路径、项目结构与相关文件内容
    pub fn build_context(&self, explored: &ExploredContext) -> String {
        let project_path = self.project_path();
        prompts::fill(
            prompts::FINAL_CONTEXT,
            &[
                ("context", &explored.files),
                ("project_structure", &explored.project_structure),
                ("project_path", &project_path),
            ],
        )
    }
}

async fn ask(llm: &dyn LlmClient, prompt: String) -> Result<String, AgentError> {
    llm.complete(&[Message::user(prompt)])
        .await
        .map_err(AgentError::DecisionUnit)
}

/// 回复中包含 "question" 即视为问题，否则为任务
pub async fn classify_input(
    llm: &dyn LlmClient,
    user_input: &str,
) -> Result<InputKind, AgentError> {
    let prompt = prompts::fill(prompts::INPUT_TYPE, &[("user_input", user_input)]);
    let reply = ask(llm, prompt).await?;
    let kind = if strip_reasoning(&reply).to_lowercase().contains("question") {
        InputKind::Question
    } else {
        InputKind::Task
    };
    tracing::info!(kind = ?kind, "input classified");
    Ok(kind)
}

pub async fn answer_question(
    llm: &dyn LlmClient,
    user_input: &str,
    context: &str,
) -> Result<String, AgentError> {
    let prompt = prompts::fill(
        prompts::ANSWER_QUESTION,
        &[("user_input", user_input), ("context", context)],
    );
    let reply = ask(llm, prompt).await?;
    Ok(strip_reasoning(&reply).to_string())
}

/// 制定计划；推理模型的思考部分被去掉，只保留计划正文
pub async fn make_plan(
    llm: &dyn LlmClient,
    user_task: &str,
    context: &str,
) -> Result<String, AgentError> {
    plan_with(llm, prompts::MAKE_PLAN, user_task, context).await
}

/// 网页模式的计划：上下文为当前页面
pub async fn make_web_plan(
    llm: &dyn LlmClient,
    user_task: &str,
    page_content: &str,
) -> Result<String, AgentError> {
    plan_with(llm, prompts::WEB_PLAN, user_task, page_content).await
}

async fn plan_with(
    llm: &dyn LlmClient,
    template: &str,
    user_task: &str,
    context: &str,
) -> Result<String, AgentError> {
    let prompt = prompts::fill(template, &[("user_task", user_task), ("context", context)]);
    let reply = ask(llm, prompt).await?;
    let plan = strip_reasoning(&reply).to_string();
    tracing::info!(chars = plan.len(), "plan drafted");
    Ok(plan)
}
