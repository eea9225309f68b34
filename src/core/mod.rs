//! 核心层：错误类型、运行状态、组件构建

pub mod builder;
pub mod error;
pub mod state;

pub use builder::{create_llm_from_config, AgentBuilder};
pub use error::{AgentError, RunFailure};
pub use state::{RunPhase, RunState};
