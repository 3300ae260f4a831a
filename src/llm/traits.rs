//! 后端抽象
//!
//! ChatBackend 负责创建会话；ChatSession 在客户端持有完整对话历史，send 把一批片段作为 user 轮发出，
//! 并把 model 回复追加进历史（即使回复没有任何片段，这正是会话损坏的表现）。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{ChatResponse, Content, Part};

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("backend error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// 创建一个空历史的新会话
    async fn create_session(&self) -> Result<Box<dyn ChatSession>, LlmError>;

    fn model(&self) -> &str;
}

#[async_trait]
pub trait ChatSession: Send {
    /// 会话标识（仅用于日志）
    fn id(&self) -> &str;

    async fn send(&mut self, parts: Vec<Part>) -> Result<ChatResponse, LlmError>;

    fn history(&self) -> &[Content];

    /// 历史中是否存在没有任何片段的轮次
    fn has_empty_turn(&self) -> bool {
        self.history().iter().any(|c| c.parts.is_empty())
    }
}
