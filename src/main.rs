//! Kiew 控制台前端
//!
//! 入口：初始化日志、加载配置、组装助手；stdin 每行作为一条私聊消息，回复写到 stdout。
//! EOF 或 Ctrl-C 时取消进行中的轮次并等待快照写盘。

use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use kiew::config::load_config;
use kiew::core::AssistantBuilder;
use kiew::gateway::{ChatKind, InboundMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kiew::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path).context("Failed to load config")?;
    let conversation_id = config.app.conversation_id;
    let user_name = std::env::var("USER").unwrap_or_else(|_| "console".to_string());

    let assistant = AssistantBuilder::new(config)
        .build()
        .await
        .context("Failed to start assistant")?;
    tracing::info!(conversation_id, bot = %assistant.dispatcher.bot_name(), "console ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(text) = line else { break };
        if text.trim().is_empty() {
            continue;
        }

        let message = InboundMessage {
            conversation_id,
            chat_kind: ChatKind::Private,
            message_id: None,
            user_id: 0,
            user_name: user_name.clone(),
            text,
            timestamp: Utc::now(),
            reply_to_bot: false,
        };
        let mut handle = assistant.dispatcher.dispatch(message);
        let reply = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                assistant.dispatcher.cancel_all();
                // 被取消的轮次会回复一条取消提示，这里不再输出
                let _ = handle.await;
                break;
            }
            joined = &mut handle => joined.context("Turn task failed")?,
        };
        if let Some(reply) = reply {
            stdout.write_all(format!("{}\n", reply.text).as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    assistant.dispatcher.cancel_all();
    assistant.shutdown().await;
    Ok(())
}
