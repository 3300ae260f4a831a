//! 存储层错误：I/O、JSON 编解码、已持久化内容损坏

use thiserror::Error;

/// 持久化与结构化存储共用的错误类型；一律作为硬错误向调用方传播
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage I/O failed for {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// 路径上存的是标量，却按物品清单操作（说明之前写入的数据已损坏或被误用）
    #[error("value at {path} is not an inventory list: {found:?}")]
    NotAnInventory { path: String, found: String },

    #[error("save queue is closed")]
    QueueClosed,
}

impl StoreError {
    pub(crate) fn io(name: &str, source: std::io::Error) -> Self {
        Self::Io {
            name: name.to_string(),
            source,
        }
    }
}
