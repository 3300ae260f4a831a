//! 后台保存队列
//!
//! 变更方在持锁期间做完快照与编码，把 (name, bytes) 投进无界通道后立即返回（fire-and-forget）；
//! 单个 worker 按投递顺序写盘，同一文件的多次快照不会乱序落地。写失败只记日志，不回传。

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::storage::{BlobStore, StoreError};

enum SaveJob {
    Write { name: String, data: Vec<u8> },
    Flush(oneshot::Sender<()>),
}

/// 保存队列句柄，可廉价 clone 给多个组件共享
#[derive(Clone)]
pub struct SaveQueue {
    tx: mpsc::UnboundedSender<SaveJob>,
}

impl SaveQueue {
    /// 启动 worker（需在 tokio runtime 内调用）
    pub fn spawn(store: Arc<dyn BlobStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(store, rx));
        Self { tx }
    }

    /// 投递一次写入，不等待结果
    pub fn enqueue(&self, name: impl Into<String>, data: Vec<u8>) {
        let name = name.into();
        if self.tx.send(SaveJob::Write { name: name.clone(), data }).is_err() {
            tracing::warn!(file = %name, "save queue closed, snapshot dropped");
        }
    }

    /// 等待此前投递的写入全部完成（退出前与测试中使用）
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(SaveJob::Flush(done_tx))
            .map_err(|_| StoreError::QueueClosed)?;
        done_rx.await.map_err(|_| StoreError::QueueClosed)
    }
}

async fn run_worker(store: Arc<dyn BlobStore>, mut rx: mpsc::UnboundedReceiver<SaveJob>) {
    while let Some(job) = rx.recv().await {
        match job {
            SaveJob::Write { name, data } => {
                let bytes = data.len();
                match store.save(&name, data).await {
                    Ok(()) => tracing::debug!(file = %name, bytes, "snapshot saved"),
                    Err(e) => tracing::warn!(file = %name, error = %e, "background save failed"),
                }
            }
            SaveJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    #[tokio::test]
    async fn test_writes_land_in_enqueue_order() {
        let store = Arc::new(MemoryBlobStore::new());
        let queue = SaveQueue::spawn(store.clone());

        for i in 0..50 {
            queue.enqueue("chat-data-7.json", format!("{i}").into_bytes());
        }
        queue.flush().await.unwrap();

        assert_eq!(store.get("chat-data-7.json").await.unwrap(), b"49");
    }
}
