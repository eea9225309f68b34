//! Stepwise 命令行入口
//!
//! 用法：
//! - 文件模式：`stepwise <project_path> <task...>`（省略目录时使用 [app].workspace_root）
//! - 网页模式：`stepwise --web <task...>`（需启用 feature "browser"）

use std::path::PathBuf;

use anyhow::{bail, Context};
use stepwise::agent::{run_file_task, TaskError, TaskHooks, TaskOutcome};
use stepwise::config::load_config;
use stepwise::core::{AgentBuilder, RunState};

const USAGE: &str = "usage: stepwise <project_path> <task...>\n       stepwise --web <task...>";

fn print_run(state: &RunState) {
    println!("Steps:");
    for (i, step) in state.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step.description);
    }
    println!("\nAction history:{}", state.action_history);
    if let Some(reply) = state.final_reply() {
        println!("\nFinal reply:\n{}", reply);
    }
}

fn report(result: Result<RunState, TaskError>) -> anyhow::Result<()> {
    match result {
        Ok(state) => {
            print_run(&state);
            Ok(())
        }
        Err(TaskError::Run(failure)) => {
            print_run(&failure.state);
            bail!("run failed: {}", failure.summary())
        }
        Err(e) => Err(e).context("task failed"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stepwise::observability::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let web = args.first().map(|a| a == "--web").unwrap_or(false);
    if web {
        args.remove(0);
    }

    let cfg = load_config(None).context("Failed to load config")?;
    let builder = AgentBuilder::new(cfg);
    let hooks = TaskHooks::default();

    // Ctrl-C 取消当前运行，部分进度照常输出
    let token = hooks.cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    if web {
        let task = args.join(" ");
        if task.trim().is_empty() {
            bail!(USAGE);
        }
        return run_web(&builder, &task, hooks).await;
    }

    // 首个参数不是目录时，使用 [app].workspace_root 作为项目目录
    let explicit = args.len() >= 2 && PathBuf::from(&args[0]).is_dir();
    let project_path = if explicit {
        PathBuf::from(args.remove(0))
    } else {
        match builder.config().app.workspace_root.clone() {
            Some(root) if root.is_dir() => root,
            _ => bail!(USAGE),
        }
    };
    let task = args.join(" ");
    if task.trim().is_empty() {
        bail!(USAGE);
    }

    match run_file_task(&builder, &task, &project_path, hooks).await {
        Ok(TaskOutcome::Answered { answer, .. }) => {
            println!("{}", answer);
            Ok(())
        }
        Ok(TaskOutcome::Executed(state)) => report(Ok(*state)),
        Err(e) => report(Err(e)),
    }
}

#[cfg(feature = "browser")]
async fn run_web(builder: &AgentBuilder, task: &str, hooks: TaskHooks) -> anyhow::Result<()> {
    report(stepwise::agent::run_web_task(builder, task, hooks).await)
}

#[cfg(not(feature = "browser"))]
async fn run_web(_builder: &AgentBuilder, _task: &str, _hooks: TaskHooks) -> anyhow::Result<()> {
    bail!("web mode requires building with `--features browser`")
}
