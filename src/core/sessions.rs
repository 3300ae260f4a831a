//! 后端会话注册表
//!
//! 每个会话一个槽位 `Arc<Mutex<Option<Box<dyn ChatSession>>>>`：编排器在整轮对话期间持有槽位锁，
//! 同一会话的轮次因此串行（tokio Mutex 为公平锁，按到达顺序执行），不同会话互不阻塞。
//! 注册表本身的 RwLock 只在查找或插入槽位时短暂持有。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::llm::{ChatBackend, ChatSession, LlmError};
use crate::store::ConversationId;

pub type SessionSlot = Arc<Mutex<Option<Box<dyn ChatSession>>>>;

pub struct SessionRegistry {
    backend: Arc<dyn ChatBackend>,
    slots: RwLock<HashMap<ConversationId, SessionSlot>>,
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub async fn slot(&self, id: ConversationId) -> SessionSlot {
        if let Some(slot) = self.slots.read().await.get(&id) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// 槽位为空时新建会话
    pub async fn ensure<'a>(
        &self,
        id: ConversationId,
        slot: &'a mut Option<Box<dyn ChatSession>>,
    ) -> Result<&'a mut Box<dyn ChatSession>, LlmError> {
        if slot.is_none() {
            let session = self.backend.create_session().await?;
            tracing::info!(conversation_id = id, session = %session.id(), model = %self.backend.model(), "session created");
            *slot = Some(session);
        }
        slot.as_mut()
            .ok_or_else(|| LlmError::InvalidResponse("session slot empty after creation".to_string()))
    }

    /// 丢弃旧会话并立即新建一个
    pub async fn replace(
        &self,
        id: ConversationId,
        slot: &mut Option<Box<dyn ChatSession>>,
    ) -> Result<(), LlmError> {
        if let Some(old) = slot.take() {
            tracing::warn!(conversation_id = id, session = %old.id(), "discarding session");
        }
        self.ensure(id, slot).await.map(|_| ())
    }

    /// 已建立过槽位的会话数
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }
}
