//! 错误恢复引擎
//!
//! 把 AgentError 映射为 RecoveryAction，保证每一轮都有一条给用户的文本回复。

use crate::core::{AgentError, RecoveryAction};
use crate::llm::LlmError;

pub const SESSION_RESET_NOTICE: &str = "Sorry, my conversation state got corrupted and I had to start a fresh session. \
    Please send your message again.";
pub const FALLBACK_REPLY: &str = "Sorry, I could not generate a response.";

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::SessionCorruption { .. } => {
                RecoveryAction::ReplaceSession(SESSION_RESET_NOTICE.to_string())
            }
            AgentError::ToolRoundsExceeded(limit) => RecoveryAction::Reply(format!(
                "Sorry, I got stuck calling functions ({limit} rounds without an answer). Please try rephrasing."
            )),
            AgentError::Llm(LlmError::RateLimited(_)) => RecoveryAction::Reply(
                "Sorry, I am being rate limited right now. Please try again in a moment.".to_string(),
            ),
            AgentError::Llm(LlmError::Network(_)) => RecoveryAction::Reply(
                "Sorry, I could not reach the language model. Please try again.".to_string(),
            ),
            AgentError::Cancelled => RecoveryAction::Reply("Request cancelled.".to_string()),
            AgentError::Storage(_) => RecoveryAction::Reply(
                "Sorry, I could not access the saved chat data.".to_string(),
            ),
            _ => RecoveryAction::Reply(FALLBACK_REPLY.to_string()),
        }
    }
}
