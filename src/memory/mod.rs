//! 记忆层：发往模型的消息格式，以及运行期间只追加的结构化对话日志

pub mod conversation;
pub mod log;

pub use conversation::{Message, Role};
pub use log::{render_entries, ConversationEntry, ConversationLog, ToolCallIntent};
