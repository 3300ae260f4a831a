//! 未被点名的群聊消息缓冲
//!
//! 每个会话一个有界 FIFO（默认 600 条），超出时丢弃最旧一条；下一次点名助手时整体渲染并拼到用户输入前，
//! 编排器用 take 在同一把写锁内渲染并清空。每次变更都在写锁内对整张表做快照（序列化即深拷贝），交给 SaveQueue 后台写盘。

use std::collections::{HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::storage::{encode_json, load_json, BlobStore, SaveQueue, StoreError};
use crate::store::ConversationId;

/// 所有会话共用的历史文件
pub const HISTORY_FILE: &str = "chat-history.json";
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 600;

/// 一条未点名消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "userID")]
    pub user_id: i64,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        user_id: i64,
        user_name: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            text: text.into(),
            timestamp,
        }
    }
}

/// `[timestamp - username]: text`
impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} - {}]: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.user_name,
            self.text
        )
    }
}

type Buffers = HashMap<ConversationId, VecDeque<HistoryEntry>>;

pub struct HistoryBuffer {
    buffers: RwLock<Buffers>,
    capacity: usize,
    queue: SaveQueue,
}

impl HistoryBuffer {
    pub fn new(capacity: usize, queue: SaveQueue) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            capacity,
            queue,
        }
    }

    /// 启动时从网关加载；超出容量的旧条目从头部裁掉
    pub async fn load(
        gateway: &dyn BlobStore,
        capacity: usize,
        queue: SaveQueue,
    ) -> Result<Self, StoreError> {
        let mut buffers: Buffers = load_json(gateway, HISTORY_FILE).await?.unwrap_or_default();
        for entries in buffers.values_mut() {
            while entries.len() > capacity {
                entries.pop_front();
            }
        }
        tracing::info!(conversations = buffers.len(), "chat history loaded");
        Ok(Self {
            buffers: RwLock::new(buffers),
            capacity,
            queue,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn append(&self, id: ConversationId, entry: HistoryEntry) {
        let mut buffers = self.buffers.write().await;
        let entries = buffers.entry(id).or_default();
        entries.push_back(entry);
        if entries.len() > self.capacity {
            entries.pop_front();
        }
        self.persist(&buffers);
    }

    /// 按时间顺序渲染为多行文本；不清空
    pub async fn render(&self, id: ConversationId) -> String {
        let buffers = self.buffers.read().await;
        buffers.get(&id).map(render_entries).unwrap_or_default()
    }

    /// 渲染并清空，在同一把写锁内完成：并发 append 要么进入本次结果，要么留在缓冲中
    pub async fn take(&self, id: ConversationId) -> String {
        let mut buffers = self.buffers.write().await;
        let Some(entries) = buffers.get_mut(&id).filter(|e| !e.is_empty()) else {
            return String::new();
        };
        let rendered = render_entries(entries);
        entries.clear();
        self.persist(&buffers);
        rendered
    }

    pub async fn clear(&self, id: ConversationId) {
        let mut buffers = self.buffers.write().await;
        match buffers.get_mut(&id) {
            Some(entries) if !entries.is_empty() => entries.clear(),
            _ => return,
        }
        self.persist(&buffers);
    }

    pub async fn len(&self, id: ConversationId) -> usize {
        self.buffers.read().await.get(&id).map_or(0, VecDeque::len)
    }

    pub async fn entries(&self, id: ConversationId) -> Vec<HistoryEntry> {
        self.buffers
            .read()
            .await
            .get(&id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn persist(&self, buffers: &Buffers) {
        match encode_json(HISTORY_FILE, buffers) {
            Ok(bytes) => self.queue.enqueue(HISTORY_FILE, bytes),
            Err(e) => tracing::warn!(error = %e, "failed to snapshot chat history"),
        }
    }
}

fn render_entries(entries: &VecDeque<HistoryEntry>) -> String {
    entries
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::storage::MemoryBlobStore;

    fn entry(i: i64) -> HistoryEntry {
        HistoryEntry::new(
            100 + i,
            format!("user{i}"),
            format!("message {i}"),
            Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap(),
        )
    }

    fn buffer(capacity: usize) -> (HistoryBuffer, Arc<MemoryBlobStore>, SaveQueue) {
        let gateway = Arc::new(MemoryBlobStore::new());
        let queue = SaveQueue::spawn(gateway.clone());
        (HistoryBuffer::new(capacity, queue.clone()), gateway, queue)
    }

    #[tokio::test]
    async fn test_append_601_keeps_latest_600() {
        let (history, _, _) = buffer(DEFAULT_MAX_HISTORY_SIZE);
        for i in 0..601 {
            history.append(5, entry(i)).await;
        }

        let entries = history.entries(5).await;
        assert_eq!(entries.len(), 600);
        assert_eq!(entries.first().unwrap().text, "message 1");
        assert_eq!(entries.last().unwrap().text, "message 600");
        assert!(entries.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_render_does_not_clear() {
        let (history, _, _) = buffer(10);
        history.append(5, entry(0)).await;
        history.append(5, entry(1)).await;

        let rendered = history.render(5).await;
        assert_eq!(
            rendered,
            "[2023-11-14T22:13:20Z - user0]: message 0\n[2023-11-14T22:13:21Z - user1]: message 1"
        );
        assert_eq!(history.len(5).await, 2);

        history.clear(5).await;
        assert_eq!(history.len(5).await, 0);
        assert_eq!(history.render(5).await, "");
    }

    #[tokio::test]
    async fn test_take_renders_and_clears() {
        let (history, _, _) = buffer(10);
        assert_eq!(history.take(5).await, "");

        history.append(5, entry(0)).await;
        let _ = history.render(5).await;
        history.append(5, entry(1)).await;

        assert_eq!(
            history.take(5).await,
            "[2023-11-14T22:13:20Z - user0]: message 0\n[2023-11-14T22:13:21Z - user1]: message 1"
        );
        assert_eq!(history.len(5).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_survive_take() {
        let (history, _, _) = buffer(1000);
        let history = Arc::new(history);

        let writers: Vec<_> = (0..200)
            .map(|i| {
                let history = history.clone();
                tokio::spawn(async move { history.append(7, entry(i)).await })
            })
            .collect();

        let mut seen = Vec::new();
        for _ in 0..50 {
            let taken = history.take(7).await;
            seen.extend(taken.lines().map(str::to_string).filter(|l| !l.is_empty()));
            tokio::task::yield_now().await;
        }
        for w in writers {
            w.await.unwrap();
        }
        seen.extend(history.entries(7).await.iter().map(ToString::to_string));

        assert_eq!(seen.len(), 200);
        for i in 0..200 {
            let line = entry(i).to_string();
            assert_eq!(seen.iter().filter(|l| **l == line).count(), 1, "{line}");
        }
    }

    #[tokio::test]
    async fn test_render_unknown_conversation_is_empty() {
        let (history, _, _) = buffer(10);
        assert_eq!(history.render(42).await, "");
    }

    #[tokio::test]
    async fn test_persisted_shape_and_reload() {
        let (history, gateway, queue) = buffer(3);
        for i in 0..2 {
            history.append(-1001, entry(i)).await;
        }
        queue.flush().await.unwrap();

        let raw = gateway.get(HISTORY_FILE).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        let first = &json["-1001"][0];
        assert_eq!(first["userID"], 100);
        assert_eq!(first["userName"], "user0");
        assert_eq!(first["text"], "message 0");
        assert!(first["timestamp"].is_string());

        let reloaded = HistoryBuffer::load(gateway.as_ref(), 1, queue).await.unwrap();
        let entries = reloaded.entries(-1001).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "message 1");
    }
}
