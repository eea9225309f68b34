//! 分步执行集成测试：脚本化 Mock LLM + 真实文件工具

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stepwise::agent::{run_file_task, TaskError, TaskHooks, TaskOutcome};
    use stepwise::config::AppConfig;
    use stepwise::core::{AgentBuilder, AgentError, RunPhase};
    use stepwise::llm::MockLlmClient;
    use stepwise::memory::{ConversationEntry, ConversationLog};
    use stepwise::react::{run_plan, RunEvent, StaticContext, StepSession};
    use stepwise::tools::BatchPolicy;

    const THREE_STEPS: &str = r#"{"steps": [
        {"description": "Read config file"},
        {"description": "Update version number"},
        {"description": "Run tests"}
    ]}"#;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("config.yaml"), "version: 1.0.0\n").unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(dir.path().join(".env"), "API_KEY=secret\n").unwrap();
        dir
    }

    fn builder(mock: &Arc<MockLlmClient>, cfg: AppConfig) -> AgentBuilder {
        AgentBuilder::new(cfg).with_llm(mock.clone())
    }

    #[tokio::test]
    async fn test_plan_runs_with_file_tools() {
        let dir = project();
        let mock = Arc::new(MockLlmClient::scripted([
            THREE_STEPS,
            r#"{"tool": "read_file", "args": {"path": "config.yaml"}}"#,
            "The version is 1.0.0.",
            r#"```json
{"tool_calls": [
  {"tool": "read_file", "args": {"path": "src/main.rs"}},
  {"tool": "read_file", "args": {"path": ".env"}}
]}
```"#,
            "Version updated.",
            "Tests pass.",
        ]));
        let builder = builder(&mock, AppConfig::default());
        let fs = builder.project_fs(dir.path());
        let executor = builder.build_executor(builder.file_tools(&fs).unwrap()).unwrap();
        let decision = builder.build_decision_unit(&executor);
        let context = StaticContext::new(fs.project_tree());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let log = ConversationLog::seeded([ConversationEntry::user("bump the version")]);
        let state = run_plan(
            StepSession::new(&decision, &executor, &context).with_event_tx(tx),
            "1. read config\n2. bump\n3. test",
            log,
            "",
        )
        .await
        .unwrap();

        assert_eq!(state.phase, RunPhase::Done);
        assert_eq!(state.current_step_index, 2);
        assert_eq!(state.tool_calls_made, 3);
        assert_eq!(state.offsets.get(1), Some(4));
        assert!(state.offsets.is_monotonic());

        // 两个并发调用的结果按发出顺序写回
        let results: Vec<&ConversationEntry> = state
            .log
            .entries()
            .iter()
            .filter(|e| matches!(e, ConversationEntry::ToolResult { .. }))
            .collect();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content(), "version: 1.0.0\n");
        assert_eq!(results[1].content(), "fn main() {}\n");
        assert!(results[2].content().starts_with("Error:"));
        assert!(!state.action_history.contains("API_KEY"));

        let mut tool_events = 0;
        let mut saw_done = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                RunEvent::ToolCall { .. } => tool_events += 1,
                RunEvent::Done { iterations } => {
                    saw_done = true;
                    assert_eq!(iterations, 5);
                }
                _ => {}
            }
        }
        assert_eq!(tool_events, 3);
        assert!(saw_done);
    }

    #[tokio::test]
    async fn test_isolated_policy_keeps_running() {
        let dir = project();
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"steps": [{"description": "Read config file"}]}"#,
            r#"{"tool_calls": [{"tool": "delete_universe", "args": {}}, {"tool": "read_file", "args": {"path": "config.yaml"}}]}"#,
            "Done.",
        ]));
        let mut cfg = AppConfig::default();
        cfg.tools.batch_policy = BatchPolicy::Isolated;
        let builder = builder(&mock, cfg);
        let fs = builder.project_fs(dir.path());
        let executor = builder.build_executor(builder.file_tools(&fs).unwrap()).unwrap();
        let decision = builder.build_decision_unit(&executor);
        let context = StaticContext::new("");

        let state = run_plan(
            StepSession::new(&decision, &executor, &context),
            "read it",
            ConversationLog::new(),
            "",
        )
        .await
        .unwrap();
        assert!(state.is_done());
        let unknown = "Tool Call: delete_universe({})\nResult: Error: unknown tool 'delete_universe'";
        assert!(state.action_history.contains(unknown));
        assert!(state.action_history.contains("Result: version: 1.0.0"));
    }

    #[tokio::test]
    async fn test_file_task_pipeline_executes_plan() {
        let dir = project();
        let artifacts = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockLlmClient::scripted([
            // 挑选文件
            r#"{"file_paths": ["config.yaml", ".env"]}"#,
            // 反思：无需更多文件
            r#"{"additional_file_paths": []}"#,
            // 分类
            "task",
            // 计划
            "<think>easy</think>1. Read config.yaml\n2. Report the version",
            // 分段
            r#"{"steps": [{"description": "Read config.yaml"}, {"description": "Report the version"}]}"#,
            r#"{"tool": "read_file", "args": {"path": "config.yaml"}}"#,
            "Read.",
            "The version is 1.0.0.",
        ]));
        let mut cfg = AppConfig::default();
        cfg.app.artifacts_dir = Some(artifacts.path().to_path_buf());
        let builder = builder(&mock, cfg);

        let task = "What version, then report it";
        let outcome = run_file_task(&builder, task, dir.path(), TaskHooks::default())
            .await
            .unwrap();
        let state = match outcome {
            TaskOutcome::Executed(state) => state,
            other => panic!("expected execution, got {:?}", other),
        };
        assert_eq!(state.plan, "1. Read config.yaml\n2. Report the version");
        assert_eq!(state.final_reply(), Some("The version is 1.0.0."));
        // 预置日志：用户任务 + 计划；第 0 步从其后开始
        assert_eq!(state.offsets.get(0), Some(2));
        assert_eq!(state.log.entries()[1].content(), state.plan);

        let context = std::fs::read_to_string(artifacts.path().join("context.txt")).unwrap();
        assert!(context.contains("--- File: config.yaml ---"));
        assert!(!context.contains("API_KEY"));
        assert!(artifacts.path().join("plan.md").exists());
        assert!(!artifacts.path().join("answer.md").exists());
    }

    #[tokio::test]
    async fn test_file_task_pipeline_answers_question() {
        let dir = project();
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"file_paths": ["src/main.rs"]}"#,
            r#"{}"#,
            "question",
            "main does nothing.",
        ]));
        let builder = builder(&mock, AppConfig::default());
        let task = "What does main do?";
        let outcome = run_file_task(&builder, task, dir.path(), TaskHooks::default())
            .await
            .unwrap();
        match outcome {
            TaskOutcome::Answered { answer, log } => {
                assert_eq!(answer, "main does nothing.");
                assert_eq!(log.len(), 2);
            }
            other => panic!("expected answer, got {:?}", other),
        }
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_file_task_failure_carries_partial_state() {
        let dir = project();
        let mock = Arc::new(MockLlmClient::scripted([
            r#"{"file_paths": ["config.yaml"]}"#,
            r#"{}"#,
            "task",
            "1. Read\n2. Destroy",
            r#"{"steps": [{"description": "Read"}, {"description": "Destroy"}]}"#,
            r#"{"tool": "read_file", "args": {"path": "config.yaml"}}"#,
            "Read.",
            r#"{"tool": "delete_universe", "args": {}}"#,
        ]));
        let builder = builder(&mock, AppConfig::default());
        let err = run_file_task(&builder, "destroy", dir.path(), TaskHooks::default())
            .await
            .unwrap_err();
        match err {
            TaskError::Run(failure) => {
                assert!(matches!(failure.error, AgentError::UnknownTool(_)));
                assert_eq!(failure.state.current_step_index, 1);
                assert!(failure.state.action_history.contains("Result: version: 1.0.0"));
                assert!(failure.summary().contains("step 2 of 2"));
            }
            other => panic!("expected run failure, got {:?}", other),
        }
    }
}
