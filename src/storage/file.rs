//! 文件持久化：data 目录下一个名称一个 JSON 文件
//!
//! 先写同目录临时文件再 rename，进程中途崩溃也不会留下半截 JSON。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::storage::{BlobStore, StoreError};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl BlobStore for JsonFileStore {
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(name, e)),
        }
    }

    async fn save(&self, name: &str, data: Vec<u8>) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StoreError::io(name, e))?;
        let path = self.path_for(name);
        let temp = path.with_extension("tmp");
        fs::write(&temp, &data)
            .await
            .map_err(|e| StoreError::io(name, e))?;
        fs::rename(&temp, &path)
            .await
            .map_err(|e| StoreError::io(name, e))
    }
}
