//! 入站消息分发
//!
//! 每条消息一个任务：未点名的消息只进历史缓冲，不回复；点名的消息渲染为一行历史格式文本交给编排器，
//! 同一会话的轮次由编排器的会话槽位锁串行。

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::Orchestrator;
use crate::gateway::{ChatKind, InboundMessage, OutboundReply};

pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    bot_name: String,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>, bot_name: impl Into<String>) -> Self {
        Self {
            orchestrator,
            bot_name: bot_name.into(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// 派生任务处理消息；未点名时任务返回 None
    pub fn dispatch(&self, message: InboundMessage) -> JoinHandle<Option<OutboundReply>> {
        let orchestrator = self.orchestrator.clone();
        let addressed = message.is_addressed(&self.bot_name);
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            let id = message.conversation_id;
            let entry = message.to_history_entry();

            if !addressed {
                tracing::debug!(conversation_id = id, user = %message.user_name, "buffered unaddressed message");
                orchestrator.history().append(id, entry).await;
                return None;
            }

            tracing::info!(conversation_id = id, user = %message.user_name, "addressed message");
            let text = orchestrator.reply(id, &entry.to_string(), &cancel).await;
            let reply_to = match message.chat_kind {
                ChatKind::Private => None,
                ChatKind::Group => message.message_id,
            };
            Some(OutboundReply {
                conversation_id: id,
                reply_to,
                text,
            })
        })
    }

    /// 取消所有进行中的轮次
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }
}
