//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时；execute 在超时内调用 registry.execute，
//! 把 ToolError / 超时映射为 AgentError，并为每次调用输出一条 JSON 审计日志。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolDeclaration;
use crate::tools::{ToolContext, ToolError, ToolRegistry};

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；结果文本原样返回（截断由编排层负责）
    pub async fn execute(&self, ctx: &ToolContext, tool_name: &str, args: Value) -> Result<String, AgentError> {
        let start = Instant::now();
        let preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, ctx, args)).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(ToolError::Validation(_))) => "invalid_args",
            Ok(Err(ToolError::UnknownTool(_))) => "unknown_tool",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "conversation_id": ctx.conversation_id,
            "tool": tool_name,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(map_tool_error(tool_name, e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.registry.declarations()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn map_tool_error(tool_name: &str, err: ToolError) -> AgentError {
    match err {
        ToolError::Validation(msg) => AgentError::Validation(msg),
        ToolError::UnknownTool(name) => AgentError::UnknownTool(name),
        ToolError::Execution(message) => AgentError::ToolExecution {
            tool: tool_name.to_string(),
            message,
        },
        ToolError::Storage(e) => AgentError::Storage(e),
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
