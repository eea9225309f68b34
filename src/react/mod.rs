//! 认知层：计划分段、Decision Unit、Continuation Router、分步执行主循环，以及计划之前的探索阶段

pub mod context;
pub mod events;
pub mod explore;
pub mod loop_;
pub mod planner;
pub mod prompts;
pub mod router;
pub mod steps;

pub use context::{ContextProvider, StaticContext};
pub use events::RunEvent;
pub use explore::{
    answer_question, classify_input, make_plan, make_web_plan, ExploredContext, Explorer, InputKind,
};
pub(crate) use loop_::guarded;
pub use loop_::{run_plan, StepRunner, StepSession, DEFAULT_MAX_ITERATIONS};
pub use planner::{parse_decision, DecisionInput, DecisionUnit};
pub use router::{route, Transition};
pub use steps::{advance, segment, window, Step, StepList, StepOffsetTable};
