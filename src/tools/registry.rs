//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找。
//! 带类型参数的工具实现 FunctionTool：参数 JSON 在注册表边界反序列化为参数结构体，不匹配即为校验错误，工具本身不会被调用。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::llm::ToolDeclaration;
use crate::storage::StoreError;
use crate::store::ConversationId;
use crate::tools::schema::parameters_schema;

/// 工具层错误
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    Validation(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Execution(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// 调用上下文：会话身份隐含在这里，不由后端在参数里传
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolContext {
    pub conversation_id: ConversationId,
}

impl ToolContext {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self { conversation_id }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value;

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<String, ToolError>;
}

/// 带类型参数的工具；schema 由参数结构体的 JsonSchema 自动生成
#[async_trait]
pub trait FunctionTool: Send + Sync {
    type Args: DeserializeOwned + JsonSchema + Send;

    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    async fn call(&self, ctx: &ToolContext, args: Self::Args) -> Result<String, ToolError>;
}

#[async_trait]
impl<T: FunctionTool> Tool for T {
    fn name(&self) -> &str {
        T::NAME
    }

    fn description(&self) -> &str {
        T::DESCRIPTION
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema::<T::Args>()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        let args: T::Args =
            serde_json::from_value(args).map_err(|e| ToolError::Validation(e.to_string()))?;
        self.call(ctx, args).await
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!(tool = %name, "tool registered twice, keeping the latest");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(ctx, args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 按名称排序的工具声明，交给后端
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut decls: Vec<ToolDeclaration> = self
            .tools
            .values()
            .map(|tool| ToolDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        decls.sort_by(|a, b| a.name.cmp(&b.name));
        decls
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        /// Text to echo back
        text: String,
    }

    struct EchoTool;

    #[async_trait]
    impl FunctionTool for EchoTool {
        type Args = EchoArgs;
        const NAME: &'static str = "echo";
        const DESCRIPTION: &'static str = "Echo text";

        async fn call(&self, ctx: &ToolContext, args: EchoArgs) -> Result<String, ToolError> {
            Ok(format!("{}: {}", ctx.conversation_id, args.text))
        }
    }

    #[tokio::test]
    async fn test_typed_args_are_decoded_at_boundary() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let ctx = ToolContext::new(7);

        let out = registry
            .execute("echo", &ctx, serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(out, "7: hi");

        let err = registry
            .execute("echo", &ctx, serde_json::json!({"text": 5}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nope", &ToolContext::new(1), Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(name) if name == "nope"));
    }

    #[test]
    fn test_declarations_carry_generated_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let decls = registry.declarations();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "echo");
        assert_eq!(decls[0].parameters["properties"]["text"]["description"], "Text to echo back");
    }
}
