//! 与后端对话的通用类型：角色、内容片段（文本 / 函数调用 / 函数结果）、回复、工具声明

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// 后端请求调用的函数
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// 部分后端给调用带 id，结果须原样带回
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
}

/// 回传给后端的函数结果
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

impl FunctionResponse {
    pub fn result(call: &FunctionCall, text: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: serde_json::json!({ "result": text.into() }),
        }
    }

    pub fn error(call: &FunctionCall, message: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response: serde_json::json!({ "error": message.into() }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }
}

/// 对话中的一轮（user 或 model），可能含多个片段
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// 后端的一次回复
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub content: Content,
    pub finish_reason: Option<String>,
    pub usage: Usage,
}

impl ChatResponse {
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self {
            content: Content::model(parts),
            finish_reason: None,
            usage: Usage::default(),
        }
    }

    /// 拼接所有文本片段
    pub fn text(&self) -> String {
        self.content
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.content
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }
}

/// 提供给后端的工具声明（参数为 JSON Schema）
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}
