//! BlobStore trait 与 JSON 编解码辅助

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::storage::StoreError;

/// 持久化网关：按名称读写整块字节；名称由调用方按会话拼出（如 chat-data-42.json）
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 读取 blob；不存在时返回 Ok(None)
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// 覆盖写入 blob
    async fn save(&self, name: &str, data: Vec<u8>) -> Result<(), StoreError>;
}

/// 读取并反序列化 JSON；文件不存在返回 None，内容损坏返回 Decode 错误
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn BlobStore,
    name: &str,
) -> Result<Option<T>, StoreError> {
    let Some(bytes) = store.load(name).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Decode {
            name: name.to_string(),
            source,
        })
}

/// 序列化为 JSON 字节（快照在调用线程完成，后台只负责写盘）
pub fn encode_json<T: Serialize + ?Sized>(name: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|source| StoreError::Encode {
        name: name.to_string(),
        source,
    })
}
