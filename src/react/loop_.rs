//! 分步执行主循环
//!
//! Segment → { Deciding → Acting | Advancing } → Done。每次迭代：读取外部上下文 → 截取当前步骤窗口 →
//! Decision Unit 产出 AssistantTurn 并追加到日志 → Router 决定执行工具、推进步骤或结束。
//! 迭代上限在每轮开始时检查，超出即 RunBudgetExceeded。取消令牌与上下文读取、决策竞争；
//! 已调度的工具批次不被中断，全部结果写回日志与 Action History 之后才返回 Cancelled。
//! 致命错误连同当时的 RunState 一起返回（RunFailure）。

use std::future::Future;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RunFailure, RunPhase, RunState};
use crate::memory::ConversationLog;
use crate::react::planner::{DecisionInput, DecisionUnit};
use crate::react::router::{route, Transition};
use crate::react::steps::{self, previous_steps_text};
use crate::react::{ContextProvider, RunEvent};
use crate::tools::ToolExecutor;

/// 默认迭代上限
pub const DEFAULT_MAX_ITERATIONS: usize = 250;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 一次运行的协作方与选项
pub struct StepSession<'a> {
    /// Decision Unit（必需）；分段也使用其 LLM
    pub decision: &'a DecisionUnit,
    /// 工具执行器（必需）
    pub executor: &'a ToolExecutor,
    /// 外部上下文（必需）
    pub context: &'a dyn ContextProvider,
    /// 取消令牌
    pub cancel_token: CancellationToken,
    /// 可选：事件推送通道
    pub event_tx: Option<UnboundedSender<RunEvent>>,
    /// Decision Unit 轮次上限
    pub max_iterations: usize,
}

impl<'a> StepSession<'a> {
    pub fn new(
        decision: &'a DecisionUnit,
        executor: &'a ToolExecutor,
        context: &'a dyn ContextProvider,
    ) -> Self {
        Self {
            decision,
            executor,
            context,
            cancel_token: CancellationToken::new(),
            event_tx: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn send(&self, ev: RunEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

/// 在取消令牌与 fut 之间竞争；取消优先
pub(crate) async fn guarded<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T, AgentError>>,
) -> Result<T, AgentError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(AgentError::Cancelled),
        r = fut => r,
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", s.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 逐步驱动的运行器：宿主可以一次推进一轮，并在任意两轮之间检查状态
pub struct StepRunner<'a> {
    session: StepSession<'a>,
    state: RunState,
}

impl<'a> StepRunner<'a> {
    /// 分段并进入第 0 步
    ///
    /// `log` 为预置日志（例如最初的用户请求与计划），第 0 步的窗口从其末尾开始。
    /// 分段失败（含空计划）时日志不被修改。
    pub async fn start(
        session: StepSession<'a>,
        plan: impl Into<String>,
        log: ConversationLog,
        action_history: impl Into<String>,
    ) -> Result<Self, RunFailure> {
        let mut state = RunState::new(plan, log, action_history);
        if session.cancel_token.is_cancelled() {
            return Err(RunFailure::new(AgentError::Cancelled, state));
        }

        let segmented = guarded(
            &session.cancel_token,
            steps::segment(session.decision.llm().as_ref(), &state.plan, state.log.len()),
        )
        .await;
        let (steps, offsets) = match segmented {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "plan segmentation failed");
                session.send(RunEvent::Error { text: e.to_string() });
                return Err(RunFailure::new(e, state));
            }
        };

        state.steps = steps;
        state.offsets = offsets;
        state.current_step_index = 0;
        state.phase = RunPhase::Deciding;

        session.send(RunEvent::Segmented {
            steps: state.steps.iter().map(|s| s.description.clone()).collect(),
        });
        let runner = Self { session, state };
        runner.announce_step();
        Ok(runner)
    }

    /// 从已有状态继续（例如放宽迭代上限后续跑）
    pub fn resume(session: StepSession<'a>, mut state: RunState) -> Self {
        if state.phase != RunPhase::Done {
            state.phase = RunPhase::Deciding;
        }
        Self { session, state }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn into_state(self) -> RunState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    fn announce_step(&self) {
        if let Some(step) = self.state.current_step() {
            tracing::info!(
                step = self.state.current_step_index + 1,
                total = self.state.steps.len(),
                description = %step.description,
                "step started"
            );
            self.session.send(RunEvent::StepStarted {
                index: self.state.current_step_index,
                total: self.state.steps.len(),
                description: step.description.clone(),
            });
        }
    }

    /// 执行一轮 Deciding →（Acting | Advancing | Done）；已完成时直接返回 Done
    ///
    /// 出错时状态保留在运行器中，可通过 [`state`](Self::state) / [`into_state`](Self::into_state) 取回。
    pub async fn step(&mut self) -> Result<Transition, AgentError> {
        if self.state.is_done() {
            return Ok(Transition::Done);
        }
        let token = self.session.cancel_token.clone();
        if token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if self.state.iterations >= self.session.max_iterations {
            tracing::warn!(limit = self.session.max_iterations, "iteration budget exhausted");
            return Err(AgentError::RunBudgetExceeded {
                limit: self.session.max_iterations,
            });
        }

        self.state.phase = RunPhase::Deciding;
        let idx = self.state.current_step_index;
        let step = self
            .state
            .steps
            .get(idx)
            .cloned()
            .ok_or(AgentError::StepIndexOutOfRange {
                index: idx,
                len: self.state.steps.len(),
            })?;
        self.session.send(RunEvent::Deciding {
            iteration: self.state.iterations + 1,
        });

        let context = guarded(&token, self.session.context.current()).await?;
        let previous = previous_steps_text(&self.state.steps, idx);
        let window = steps::window(&self.state.log, &self.state.offsets, idx);
        let input = DecisionInput {
            current_step: &step.description,
            previous_steps: &previous,
            plan: &self.state.plan,
            context: &context,
            window,
        };
        let entry = guarded(&token, self.session.decision.decide(&input)).await?;

        self.state.iterations += 1;
        self.state.log.push(entry.clone());
        let transition = route(&entry, idx, self.state.steps.len());
        tracing::info!(
            step = idx + 1,
            iteration = self.state.iterations,
            transition = ?transition,
            "routed"
        );
        self.session.send(RunEvent::Routed { transition });

        match transition {
            Transition::Act => {
                self.state.phase = RunPhase::Acting;
                let intents = entry.tool_call_intents();
                for intent in intents {
                    self.session.send(RunEvent::ToolCall {
                        id: intent.id.clone(),
                        tool: intent.name.clone(),
                        args: serde_json::Value::Object(intent.arguments.clone()),
                    });
                }
                // 工具自身负责取消；批次在这里总是完整等待
                let outcome = self.session.executor.execute(intents).await?;
                outcome.apply(&mut self.state.log, &mut self.state.action_history);
                self.state.tool_calls_made += outcome.len();
                for o in &outcome.outcomes {
                    self.session.send(RunEvent::Observation {
                        id: o.intent.id.clone(),
                        preview: preview(&o.observation),
                    });
                }
                self.state.phase = RunPhase::Deciding;
                if token.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
            }
            Transition::Advance => {
                self.state.phase = RunPhase::Advancing;
                self.state.current_step_index = steps::advance(
                    idx,
                    self.state.steps.len(),
                    self.state.log.len(),
                    &mut self.state.offsets,
                )?;
                self.state.phase = RunPhase::Deciding;
                self.announce_step();
            }
            Transition::Done => {
                self.state.phase = RunPhase::Done;
                tracing::info!(
                    iterations = self.state.iterations,
                    tool_calls = self.state.tool_calls_made,
                    "plan completed"
                );
                self.session.send(RunEvent::Done {
                    iterations: self.state.iterations,
                });
            }
        }
        Ok(transition)
    }

    /// 循环直到 Done 或出错
    pub async fn run(mut self) -> Result<RunState, RunFailure> {
        loop {
            match self.step().await {
                Ok(Transition::Done) => return Ok(self.state),
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        step = self.state.current_step_index + 1,
                        "run aborted"
                    );
                    self.session.send(RunEvent::Error { text: e.to_string() });
                    return Err(RunFailure::new(e, self.state));
                }
            }
        }
    }
}

/// 单一入口：分段并执行整个计划
pub async fn run_plan(
    session: StepSession<'_>,
    plan: impl Into<String>,
    log: ConversationLog,
    action_history: impl Into<String>,
) -> Result<RunState, RunFailure> {
    StepRunner::start(session, plan, log, action_history)
        .await?
        .run()
        .await
}
