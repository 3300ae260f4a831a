//! 后端层：会话抽象、通用类型、Gemini 实现与脚本化 Mock

pub mod gemini;
pub mod mock;
pub mod traits;
pub mod types;

pub use gemini::{GeminiBackend, GeminiSettings};
pub use mock::ScriptedBackend;
pub use traits::{ChatBackend, ChatSession, LlmError};
pub use types::{
    ChatResponse, Content, FunctionCall, FunctionResponse, Part, Role, ToolDeclaration, Usage,
};
