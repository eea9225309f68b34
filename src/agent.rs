//! 无头任务流水线（供 CLI 或其它宿主调用）
//!
//! 文件模式：项目树 → 挑选文件 → 有界反思 → 构建上下文 → 判断问题/任务 →
//! 问题则直接回答；任务则制定计划并以文件工具分步执行。
//! 网页模式：获取浏览器会话 → 打开起始页 → 以页面为上下文制定计划 → 以网页工具分步执行；会话在所有退出路径上释放。

use std::future::Future;
use std::path::Path;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentBuilder, AgentError, RunFailure, RunState};
use crate::memory::{ConversationEntry, ConversationLog};
use crate::react::{
    answer_question, classify_input, guarded, make_plan, run_plan, InputKind, RunEvent,
    StaticContext, StepSession,
};

/// 流水线错误：计划执行之前的错误，或带部分状态的执行失败
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Run(#[from] RunFailure),
}

/// 宿主对一次任务的控制：取消与进度事件
#[derive(Default, Clone)]
pub struct TaskHooks {
    pub cancel_token: CancellationToken,
    pub event_tx: Option<UnboundedSender<RunEvent>>,
}

impl TaskHooks {
    /// 计划之前的各阶段同样响应取消
    async fn guard<T>(
        &self,
        fut: impl Future<Output = Result<T, AgentError>>,
    ) -> Result<T, AgentError> {
        guarded(&self.cancel_token, fut).await
    }

    fn apply<'a>(&self, session: StepSession<'a>) -> StepSession<'a> {
        let session = session.with_cancel_token(self.cancel_token.clone());
        match &self.event_tx {
            Some(tx) => session.with_event_tx(tx.clone()),
            None => session,
        }
    }
}

/// 文件模式的结果
#[derive(Debug)]
pub enum TaskOutcome {
    /// 输入被判定为问题，已直接回答
    Answered { answer: String, log: ConversationLog },
    /// 输入被判定为任务，计划已执行完毕
    Executed(Box<RunState>),
}

/// 写出中间产物；未配置目录时跳过，写入失败只记录 warn
fn write_artifact(dir: Option<&Path>, name: &str, content: &str) {
    let Some(dir) = dir else {
        return;
    };
    let written =
        std::fs::create_dir_all(dir).and_then(|_| std::fs::write(dir.join(name), content));
    if let Err(e) = written {
        tracing::warn!(file = name, error = %e, "failed to write artifact");
    } else {
        tracing::info!(file = %dir.join(name).display(), "artifact written");
    }
}

/// 文件模式：对 project_path 下的项目执行 task
pub async fn run_file_task(
    builder: &AgentBuilder,
    task: &str,
    project_path: &Path,
    hooks: TaskHooks,
) -> Result<TaskOutcome, TaskError> {
    let cfg = builder.config();
    let artifacts = cfg.app.artifacts_dir.as_deref();
    let llm = builder.llm();

    let fs = builder.project_fs(project_path);
    let explorer = builder.build_explorer(fs.clone());
    let explored = hooks.guard(explorer.explore(task)).await?;
    let explored = hooks
        .guard(async { Ok::<_, AgentError>(explorer.reflect(task, explored).await) })
        .await?;
    let context = explorer.build_context(&explored);
    write_artifact(artifacts, "context.txt", &context);

    let kind = hooks.guard(classify_input(llm.as_ref(), task)).await?;
    if kind == InputKind::Question {
        let answer = hooks
            .guard(answer_question(llm.as_ref(), task, &context))
            .await?;
        write_artifact(artifacts, "answer.md", &answer);
        let log = ConversationLog::seeded([
            ConversationEntry::user(task),
            ConversationEntry::user(answer.clone()),
        ]);
        return Ok(TaskOutcome::Answered { answer, log });
    }

    let plan = hooks.guard(make_plan(llm.as_ref(), task, &context)).await?;
    write_artifact(artifacts, "plan.md", &plan);

    let executor = builder.build_executor(builder.file_tools(&fs)?)?;
    let decision = builder.build_decision_unit(&executor);
    let project_context = StaticContext::new(explored.project_structure);
    let session = hooks.apply(
        StepSession::new(&decision, &executor, &project_context)
            .with_max_iterations(cfg.app.max_iterations),
    );
    let log = ConversationLog::seeded([
        ConversationEntry::user(task),
        ConversationEntry::user(plan.clone()),
    ]);
    let state = run_plan(session, plan, log, "").await?;
    Ok(TaskOutcome::Executed(Box::new(state)))
}

/// 网页模式：启动浏览器执行 task；会话在返回前关闭
#[cfg(feature = "browser")]
pub async fn run_web_task(
    builder: &AgentBuilder,
    task: &str,
    hooks: TaskHooks,
) -> Result<RunState, TaskError> {
    use crate::tools::BrowserSession;

    let session = BrowserSession::launch(&builder.config().browser).await?;
    let result = drive_web_task(builder, task, &session, hooks).await;
    session.close();
    result
}

#[cfg(feature = "browser")]
async fn drive_web_task(
    builder: &AgentBuilder,
    task: &str,
    session: &std::sync::Arc<crate::tools::BrowserSession>,
    hooks: TaskHooks,
) -> Result<RunState, TaskError> {
    use crate::react::make_web_plan;
    use crate::tools::{web_tools, PageContext};

    let cfg = builder.config();
    let llm = builder.llm();
    let start_url = cfg.browser.start_url.clone();

    hooks
        .guard(async { session.goto(&start_url).await.map_err(AgentError::Browser) })
        .await?;
    let action_history = format!("Initialized browser and navigated to {}", start_url);
    let page = hooks
        .guard(async {
            let page = session.page_content().await;
            let page = page.unwrap_or_else(|e| format!("Error getting page content: {}", e));
            Ok::<_, AgentError>(page)
        })
        .await?;

    let plan = hooks.guard(make_web_plan(llm.as_ref(), task, &page)).await?;
    write_artifact(cfg.app.artifacts_dir.as_deref(), "plan.md", &plan);

    let executor = builder.build_executor(web_tools(session)?)?;
    let decision = builder.build_decision_unit(&executor);
    let page_context = PageContext::new(session.clone());
    let step_session = hooks.apply(
        StepSession::new(&decision, &executor, &page_context)
            .with_max_iterations(cfg.app.max_iterations),
    );
    let log = ConversationLog::seeded([
        ConversationEntry::user(task),
        ConversationEntry::user(plan.clone()),
    ]);
    Ok(run_plan(step_session, plan, log, action_history).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_before_planning_skips_model_calls() {
        use crate::config::AppConfig;
        use crate::llm::MockLlmClient;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "version: 1.0.0\n").unwrap();
        let mock = Arc::new(MockLlmClient::scripted([r#"{"file_paths": ["config.yaml"]}"#]));
        let builder = AgentBuilder::new(AppConfig::default()).with_llm(mock.clone());
        let hooks = TaskHooks::default();
        hooks.cancel_token.cancel();

        let err = run_file_task(&builder, "bump it", dir.path(), hooks)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Agent(AgentError::Cancelled)));
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_write_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        write_artifact(Some(&out), "plan.md", "1. do it");
        assert_eq!(std::fs::read_to_string(out.join("plan.md")).unwrap(), "1. do it");
        write_artifact(None, "plan.md", "ignored");
    }
}
