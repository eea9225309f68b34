pub mod executor;
pub mod files;
pub mod registry;
pub mod schema;

#[cfg(feature = "browser")]
pub mod browser;

pub use executor::{action_history_line, BatchOutcome, BatchPolicy, ToolExecutor, ToolOutcome};
pub use files::{ProjectFs, ProjectTreeTool, ReadFileTool, ReadFilesTool};
pub use registry::{LocalTool, LocalTools, RemoteTools, Tool, ToolRegistry, ToolSource};
pub use schema::{render_tool_specs, tool_call_schema_json, ToolSpec};

#[cfg(feature = "browser")]
pub use browser::{web_tools, BrowserSession, PageContext};
