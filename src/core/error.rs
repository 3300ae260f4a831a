//! 编排层错误分类与恢复动作
//!
//! Validation / UnknownTool / ToolExecution / ToolTimeout 为非致命错误，以文本形式回给后端；
//! Storage 是存储调用方看到的硬错误；SessionCorruption 通过替换会话恢复；Config 仅出现在启动阶段，为致命错误。

use thiserror::Error;

use crate::llm::LlmError;
use crate::storage::StoreError;
use crate::store::ConversationId;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("invalid arguments: {0}")]
    Validation(String),

    #[error("unknown function: {0}")]
    UnknownTool(String),

    #[error("tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("tool timeout: {0}")]
    ToolTimeout(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// 后端会话历史里出现了零 part 的轮次，之后的回复都会为空
    #[error("session for conversation {conversation_id} is corrupted")]
    SessionCorruption { conversation_id: ConversationId },

    #[error("too many function-call rounds (limit {0})")]
    ToolRoundsExceeded(usize),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),
}

/// 恢复引擎根据错误类型给出的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 丢弃该会话的后端会话并新建，回复给定的提示
    ReplaceSession(String),
    /// 直接把给定文本作为回复
    Reply(String),
}
