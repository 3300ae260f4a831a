//! 脚本化 Mock 后端（用于测试，无需 API）
//!
//! 按顺序弹出预设回复；所有会话共享同一份脚本，并记录每次发出的 user 内容，便于断言。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{ChatBackend, ChatResponse, ChatSession, Content, LlmError, Part};

#[derive(Default)]
struct Script {
    responses: VecDeque<Result<ChatResponse, String>>,
    sent: Vec<Vec<Part>>,
    sessions_created: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub fn new(responses: impl IntoIterator<Item = ChatResponse>) -> Self {
        let backend = Self::default();
        for r in responses {
            backend.push(r);
        }
        backend
    }

    pub fn push(&self, response: ChatResponse) {
        self.lock().responses.push_back(Ok(response));
    }

    /// 下一次 send 返回后端错误
    pub fn push_error(&self, message: impl Into<String>) {
        self.lock().responses.push_back(Err(message.into()));
    }

    pub fn sessions_created(&self) -> usize {
        self.lock().sessions_created
    }

    /// 所有会话按时间顺序发出的 user 内容
    pub fn sent(&self) -> Vec<Vec<Part>> {
        self.lock().sent.clone()
    }

    pub fn remaining(&self) -> usize {
        self.lock().responses.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        // 测试内不会在持锁时 panic；中毒时沿用内部数据
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn create_session(&self) -> Result<Box<dyn ChatSession>, LlmError> {
        let index = {
            let mut script = self.lock();
            script.sessions_created += 1;
            script.sessions_created
        };
        Ok(Box::new(ScriptedSession {
            id: format!("scripted-{index}"),
            backend: self.clone(),
            history: Vec::new(),
        }))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

pub struct ScriptedSession {
    id: String,
    backend: ScriptedBackend,
    history: Vec<Content>,
}

#[async_trait]
impl ChatSession for ScriptedSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&mut self, parts: Vec<Part>) -> Result<ChatResponse, LlmError> {
        let next = {
            let mut script = self.backend.lock();
            script.sent.push(parts.clone());
            script.responses.pop_front()
        };
        match next {
            Some(Ok(response)) => {
                self.history.push(Content::user(parts));
                self.history.push(response.content.clone());
                Ok(response)
            }
            Some(Err(message)) => Err(LlmError::Api {
                status: 500,
                message,
            }),
            None => Err(LlmError::InvalidResponse("script exhausted".to_string())),
        }
    }

    fn history(&self) -> &[Content] {
        &self.history
    }
}
