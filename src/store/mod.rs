//! 结构化存储：每会话的 `subject.property` 键值表，支持标量与物品清单

pub mod chat_store;
pub mod path;
pub mod types;

pub use chat_store::{chat_data_file, ChatStore};
pub use path::{PathError, StorePath};
pub use types::{AddOutcome, ChatData, ConversationId, InventoryItem, RemoveOutcome, StoreValue};
