//! 对话编排器：单轮对话的主控循环
//!
//! converse(id, text)：
//! 1. 取会话槽位锁（同一会话串行），把缓冲的群聊历史拼到输入前面并清空缓冲
//! 2. 发送到已有或新建的后端会话
//! 3. 循环解析函数调用：未知工具 / 工具失败都以错误文本回传，超长结果截断并附带说明；批量回传后继续，轮数有上限
//! 4. 收尾：有文本直接返回；无文本时检查会话历史里是否有零 part 的轮次，有则替换会话并提示用户重试
//!
//! reply 包装 converse，任何错误经 RecoveryEngine 转成给用户的文本，保证总有回复。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::recovery::FALLBACK_REPLY;
use crate::core::resolve::{truncate_result, truncation_note, FUNCTION_RESULT_LIMIT};
use crate::core::{AgentError, RecoveryAction, RecoveryEngine, SessionRegistry};
use crate::history::HistoryBuffer;
use crate::llm::{ChatBackend, ChatResponse, ChatSession, Content, FunctionCall, FunctionResponse, Part, Role};
use crate::store::ConversationId;
use crate::tools::{ToolContext, ToolExecutor};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 16;

/// 单轮对话的限制
#[derive(Debug, Clone, Copy)]
pub struct TurnLimits {
    pub max_tool_rounds: usize,
    pub function_result_limit: usize,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            function_result_limit: FUNCTION_RESULT_LIMIT,
        }
    }
}

pub struct Orchestrator {
    sessions: SessionRegistry,
    history: Arc<HistoryBuffer>,
    executor: ToolExecutor,
    recovery: RecoveryEngine,
    limits: TurnLimits,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        history: Arc<HistoryBuffer>,
        executor: ToolExecutor,
        limits: TurnLimits,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(backend),
            history,
            executor,
            recovery: RecoveryEngine::new(),
            limits,
        }
    }

    pub fn history(&self) -> &Arc<HistoryBuffer> {
        &self.history
    }

    /// 处理一条发给助手的消息；工具层错误不会中断本轮
    pub async fn converse(
        &self,
        id: ConversationId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let slot = self.sessions.slot(id).await;
        let mut guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            guard = slot.lock() => guard,
        };

        let composed = self.compose(id, text).await;
        let session = self.sessions.ensure(id, &mut guard).await?;

        let response = match self.run_turn(id, &mut **session, composed, cancel).await {
            Ok(response) => response,
            Err(e) => {
                // 停在未回应的函数调用上的会话无法继续，下次重建
                if awaiting_function_response(session.history()) {
                    tracing::warn!(conversation_id = id, error = %e, "dropping session left mid function call");
                    *guard = None;
                }
                return Err(e);
            }
        };

        let reply = response.text();
        if !reply.trim().is_empty() {
            return Ok(reply);
        }

        if session.has_empty_turn() {
            let err = AgentError::SessionCorruption { conversation_id: id };
            tracing::warn!(conversation_id = id, session = %session.id(), "{err}");
            return match self.recovery.handle(&err) {
                RecoveryAction::ReplaceSession(notice) => {
                    self.sessions.replace(id, &mut guard).await?;
                    Ok(notice)
                }
                RecoveryAction::Reply(text) => Ok(text),
            };
        }

        tracing::warn!(conversation_id = id, finish_reason = ?response.finish_reason, "empty reply");
        Ok(FALLBACK_REPLY.to_string())
    }

    /// converse 的不会失败版本
    pub async fn reply(&self, id: ConversationId, text: &str, cancel: &CancellationToken) -> String {
        match self.converse(id, text, cancel).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(conversation_id = id, error = %e, "turn failed");
                match self.recovery.handle(&e) {
                    RecoveryAction::Reply(text) => text,
                    RecoveryAction::ReplaceSession(notice) => {
                        let slot = self.sessions.slot(id).await;
                        let mut guard = slot.lock().await;
                        if let Err(e) = self.sessions.replace(id, &mut guard).await {
                            tracing::warn!(conversation_id = id, error = %e, "session replacement failed");
                        }
                        notice
                    }
                }
            }
        }
    }

    /// 缓冲历史（按时间顺序）+ 本条输入；消费后清空缓冲
    async fn compose(&self, id: ConversationId, text: &str) -> String {
        let buffered = self.history.take(id).await;
        if buffered.is_empty() {
            return text.to_string();
        }
        format!("{buffered}\n{text}")
    }

    async fn run_turn(
        &self,
        id: ConversationId,
        session: &mut dyn ChatSession,
        composed: String,
        cancel: &CancellationToken,
    ) -> Result<ChatResponse, AgentError> {
        tracing::debug!(conversation_id = id, chars = composed.chars().count(), "sending message");
        let ctx = ToolContext::new(id);
        let mut response = send(session, vec![Part::text(composed)], cancel).await?;
        let mut rounds = 0usize;

        loop {
            let calls = response.function_calls();
            if calls.is_empty() {
                return Ok(response);
            }
            if rounds >= self.limits.max_tool_rounds {
                return Err(AgentError::ToolRoundsExceeded(self.limits.max_tool_rounds));
            }
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            rounds += 1;
            tracing::info!(conversation_id = id, round = rounds, calls = calls.len(), "resolving function calls");

            let batch = self.resolve_calls(&ctx, calls).await;
            response = send(session, batch, cancel).await?;
        }
    }

    /// 逐个执行函数调用，返回函数结果 + 截断说明组成的批次
    async fn resolve_calls(&self, ctx: &ToolContext, calls: Vec<FunctionCall>) -> Vec<Part> {
        let limit = self.limits.function_result_limit;
        let mut parts = Vec::with_capacity(calls.len());
        let mut notes = Vec::new();

        for call in calls {
            match self.executor.execute(ctx, &call.name, call.args.clone()).await {
                Ok(result) => match truncate_result(&result, limit) {
                    Some(short) => {
                        let original = result.chars().count();
                        tracing::debug!(tool = %call.name, original, limit, "function result truncated");
                        notes.push(Part::text(truncation_note(&call.name, original, limit)));
                        parts.push(Part::FunctionResponse(FunctionResponse::result(&call, short)));
                    }
                    None => parts.push(Part::FunctionResponse(FunctionResponse::result(&call, result))),
                },
                Err(e) => {
                    tracing::warn!(conversation_id = ctx.conversation_id, tool = %call.name, error = %e, "function call failed");
                    parts.push(Part::FunctionResponse(FunctionResponse::error(&call, e.to_string())));
                }
            }
        }

        parts.extend(notes);
        parts
    }
}

async fn send(
    session: &mut dyn ChatSession,
    parts: Vec<Part>,
    cancel: &CancellationToken,
) -> Result<ChatResponse, AgentError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        response = session.send(parts) => Ok(response?),
    }
}

fn awaiting_function_response(history: &[Content]) -> bool {
    history.last().is_some_and(|turn| {
        turn.role == Role::Model && turn.parts.iter().any(|p| matches!(p, Part::FunctionCall(_)))
    })
}
