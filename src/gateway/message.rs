//! 入站 / 出站消息
//!
//! 与聊天平台无关的消息格式；平台适配层把自己的更新转换为 InboundMessage。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::HistoryEntry;
use crate::store::ConversationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    Private,
    Group,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub conversation_id: ConversationId,
    pub chat_kind: ChatKind,
    /// 平台消息 ID，群聊回复时引用
    #[serde(default)]
    pub message_id: Option<i64>,
    pub user_id: i64,
    pub user_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// 是否是对助手某条消息的回复
    #[serde(default)]
    pub reply_to_bot: bool,
}

impl InboundMessage {
    /// 私聊、提到助手名（不区分大小写）或回复助手时，视为点名
    pub fn is_addressed(&self, bot_name: &str) -> bool {
        if self.chat_kind == ChatKind::Private || self.reply_to_bot {
            return true;
        }
        !bot_name.is_empty() && self.text.to_lowercase().contains(&bot_name.to_lowercase())
    }

    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry::new(self.user_id, self.user_name.clone(), self.text.clone(), self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub conversation_id: ConversationId,
    /// 群聊中回复到触发的那条消息；私聊为 None
    pub reply_to: Option<i64>,
    pub text: String,
}
