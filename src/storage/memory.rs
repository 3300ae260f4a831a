//! 内存持久化（测试与无盘运行用）

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{BlobStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接写入一个 blob（测试中预置旧数据）
    pub async fn insert(&self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.blobs.write().await.insert(name.into(), data.into());
    }

    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(name).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.get(name).await)
    }

    async fn save(&self, name: &str, data: Vec<u8>) -> Result<(), StoreError> {
        self.blobs.write().await.insert(name.to_string(), data);
        Ok(())
    }
}
