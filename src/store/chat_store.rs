//! 每会话结构化存储
//!
//! 注册表只在查找/插入会话时短暂持锁；每个会话自己一把 RwLock：get / show 取读锁，变更取写锁。
//! 首次访问时从持久化网关懒加载；每次变更后在写锁内做快照并投递到 SaveQueue（不等待写盘）。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::storage::{encode_json, load_json, BlobStore, SaveQueue, StoreError};
use crate::store::{AddOutcome, ChatData, ConversationId, RemoveOutcome, StorePath, StoreValue};

/// 会话数据文件名
pub fn chat_data_file(conversation_id: ConversationId) -> String {
    format!("chat-data-{conversation_id}.json")
}

pub struct ChatStore {
    gateway: Arc<dyn BlobStore>,
    queue: SaveQueue,
    conversations: RwLock<HashMap<ConversationId, Arc<RwLock<ChatData>>>>,
}

impl ChatStore {
    pub fn new(gateway: Arc<dyn BlobStore>, queue: SaveQueue) -> Self {
        Self {
            gateway,
            queue,
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// 取会话数据；未缓存时从网关加载，文件内容损坏则返回 StoreError
    async fn conversation(&self, id: ConversationId) -> Result<Arc<RwLock<ChatData>>, StoreError> {
        if let Some(data) = self.conversations.read().await.get(&id) {
            return Ok(data.clone());
        }

        let name = chat_data_file(id);
        let data: ChatData = load_json(self.gateway.as_ref(), &name)
            .await?
            .unwrap_or_default();
        tracing::debug!(conversation_id = id, entries = data.len(), "chat data loaded");

        // 并发首次访问时以先插入者为准
        let mut map = self.conversations.write().await;
        Ok(map
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(data)))
            .clone())
    }

    fn persist(&self, id: ConversationId, data: &ChatData) -> Result<(), StoreError> {
        let name = chat_data_file(id);
        let bytes = encode_json(&name, data)?;
        self.queue.enqueue(name, bytes);
        Ok(())
    }

    pub async fn get(&self, id: ConversationId, path: &StorePath) -> Result<Option<StoreValue>, StoreError> {
        let data = self.conversation(id).await?;
        let guard = data.read().await;
        Ok(guard.get(path.as_str()).cloned())
    }

    pub async fn set(&self, id: ConversationId, path: &StorePath, value: &str) -> Result<(), StoreError> {
        let data = self.conversation(id).await?;
        let mut guard = data.write().await;
        guard.set(path.as_str(), value);
        self.persist(id, &guard)
    }

    pub async fn add(
        &self,
        id: ConversationId,
        path: &StorePath,
        item: &str,
        quantity: u32,
    ) -> Result<AddOutcome, StoreError> {
        let data = self.conversation(id).await?;
        let mut guard = data.write().await;
        let outcome = guard.add(path.as_str(), item, quantity)?;
        self.persist(id, &guard)?;
        Ok(outcome)
    }

    pub async fn remove(
        &self,
        id: ConversationId,
        path: &StorePath,
        item: &str,
        quantity: u32,
    ) -> Result<RemoveOutcome, StoreError> {
        let data = self.conversation(id).await?;
        let mut guard = data.write().await;
        let before = guard.get(path.as_str()).cloned();
        let outcome = guard.remove(path.as_str(), item, quantity)?;
        // 字符串编码的旧清单在未命中时也可能被升级或删除
        if outcome.mutated() || guard.get(path.as_str()) != before.as_ref() {
            self.persist(id, &guard)?;
        }
        Ok(outcome)
    }

    /// 级联删除 subject 或单个属性，返回被删除的键
    pub async fn delete(&self, id: ConversationId, path: &StorePath) -> Result<Vec<String>, StoreError> {
        let data = self.conversation(id).await?;
        let mut guard = data.write().await;
        let deleted = guard.delete(path.as_str());
        if !deleted.is_empty() {
            self.persist(id, &guard)?;
        }
        Ok(deleted)
    }

    pub async fn show(&self, id: ConversationId) -> Result<Option<String>, StoreError> {
        let data = self.conversation(id).await?;
        let guard = data.read().await;
        Ok(guard.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn store() -> (ChatStore, Arc<MemoryBlobStore>, SaveQueue) {
        let gateway = Arc::new(MemoryBlobStore::new());
        let queue = SaveQueue::spawn(gateway.clone());
        (ChatStore::new(gateway.clone(), queue.clone()), gateway, queue)
    }

    fn p(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (store, _, _) = store();
        store.set(1, &p("Hel.hp"), "25").await.unwrap();
        assert_eq!(
            store.get(1, &p("Hel.hp")).await.unwrap(),
            Some(StoreValue::Scalar("25".to_string()))
        );
        assert_eq!(store.get(1, &p("Hel.ac")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_twice_shows_quantity_two() {
        let (store, _, _) = store();
        let path = p("Hel.inventory");
        store.add(1, &path, "Sword", 1).await.unwrap();
        let second = store.add(1, &path, "Sword", 1).await.unwrap();
        assert_eq!(second, AddOutcome::Incremented { total: 2 });

        let shown = store.show(1).await.unwrap().unwrap();
        assert!(shown.contains("Hel.inventory: Sword (x2)"));
    }

    #[tokio::test]
    async fn test_remove_decrements_then_drops() {
        let (store, _, _) = store();
        let path = p("Hel.inventory");
        store.add(1, &path, "Sword", 2).await.unwrap();

        assert_eq!(
            store.remove(1, &path, "Sword", 1).await.unwrap(),
            RemoveOutcome::Decremented { removed: 1, total: 1 }
        );
        assert_eq!(
            store.remove(1, &path, "Sword", 1).await.unwrap(),
            RemoveOutcome::Removed
        );
        assert_eq!(store.get(1, &path).await.unwrap(), None);
        assert_eq!(store.show(1).await.unwrap(), None);
        assert_eq!(
            store.remove(1, &path, "Sword", 1).await.unwrap(),
            RemoveOutcome::PathEmpty
        );
    }

    #[tokio::test]
    async fn test_delete_subject_cascades() {
        let (store, _, _) = store();
        store.set(1, &p("Hel.hp"), "25").await.unwrap();
        store.add(1, &p("Hel.inventory"), "Sword", 1).await.unwrap();
        store.set(1, &p("Thif.hp"), "12").await.unwrap();

        let mut deleted = store.delete(1, &p("Hel")).await.unwrap();
        deleted.sort();
        assert_eq!(deleted, vec!["Hel.hp".to_string(), "Hel.inventory".to_string()]);
        assert_eq!(store.get(1, &p("Hel.hp")).await.unwrap(), None);
        assert_eq!(
            store.get(1, &p("Thif.hp")).await.unwrap(),
            Some(StoreValue::Scalar("12".to_string()))
        );
        assert!(store.delete(1, &p("Hel")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let (store, _, _) = store();
        store.set(1, &p("Hel.hp"), "25").await.unwrap();
        assert_eq!(store.get(2, &p("Hel.hp")).await.unwrap(), None);
        assert_eq!(store.show(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mutations_are_persisted_and_reloaded() {
        let (store, gateway, queue) = store();
        store.set(9, &p("Hel.hp"), "25").await.unwrap();
        store.add(9, &p("Hel.inventory"), "Sword", 3).await.unwrap();
        queue.flush().await.unwrap();

        let raw = gateway.get(&chat_data_file(9)).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["Hel.inventory"][0]["quantity"], 3);

        let reopened = ChatStore::new(gateway.clone(), queue);
        assert_eq!(
            reopened.get(9, &p("Hel.hp")).await.unwrap(),
            Some(StoreValue::Scalar("25".to_string()))
        );
    }

    #[tokio::test]
    async fn test_string_encoded_list_behaves_the_same_across_reload() {
        let (store, gateway, queue) = store();
        let path = p("Hel.note");
        let encoded = r#"[{"value": "a", "quantity": 1}]"#;
        store.set(5, &path, encoded).await.unwrap();
        queue.flush().await.unwrap();

        let reopened = ChatStore::new(gateway.clone(), queue.clone());
        for s in [&store, &reopened] {
            assert_eq!(
                s.get(5, &path).await.unwrap(),
                Some(StoreValue::Scalar(encoded.to_string()))
            );
        }
        for s in [&store, &reopened] {
            assert_eq!(
                s.add(5, &path, "a", 1).await.unwrap(),
                AddOutcome::Incremented { total: 2 }
            );
        }
    }

    #[tokio::test]
    async fn test_string_encoded_empty_list_is_dropped_and_persisted() {
        let (store, gateway, queue) = store();
        gateway.insert(chat_data_file(6), r#"{"Hel.inventory": "[]"}"#).await;
        let path = p("Hel.inventory");

        assert_eq!(
            store.remove(6, &path, "Rope", 1).await.unwrap(),
            RemoveOutcome::PathEmpty
        );
        assert_eq!(store.get(6, &path).await.unwrap(), None);
        queue.flush().await.unwrap();

        let reopened = ChatStore::new(gateway.clone(), queue);
        assert_eq!(reopened.get(6, &path).await.unwrap(), None);
        assert_eq!(reopened.show(6).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupted_file_is_storage_error() {
        let (store, gateway, _) = store();
        gateway.insert(chat_data_file(3), "{not json").await;
        let err = store.get(3, &p("Hel.hp")).await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }
}
