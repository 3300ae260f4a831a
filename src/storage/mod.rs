//! 持久化网关：按名称异步读写 JSON blob（文件 / 内存），以及后台有序保存队列

pub mod blob;
pub mod error;
pub mod file;
pub mod memory;
pub mod queue;

pub use blob::{encode_json, load_json, BlobStore};
pub use error::StoreError;
pub use file::JsonFileStore;
pub use memory::MemoryBlobStore;
pub use queue::SaveQueue;
