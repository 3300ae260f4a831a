//! 入站网关：平台无关的消息格式与按消息派生任务的分发器

pub mod dispatcher;
pub mod message;

pub use dispatcher::Dispatcher;
pub use message::{ChatKind, InboundMessage, OutboundReply};
