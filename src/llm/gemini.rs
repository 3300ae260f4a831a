//! Google Gemini generateContent 客户端
//!
//! 对话历史保存在客户端（GeminiChat），每次请求携带完整历史、系统指令与工具声明。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{
    ChatBackend, ChatResponse, ChatSession, Content, FunctionCall, FunctionResponse, LlmError,
    Part, Role, ToolDeclaration, Usage,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// 构建 GeminiBackend 所需参数
#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
    pub system_prompt: Option<String>,
}

struct GeminiClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: Option<String>,
    tools: Vec<ToolDeclaration>,
}

impl GeminiClient {
    async fn generate(&self, history: &[Content]) -> Result<ChatResponse, LlmError> {
        let request = build_request(history, self.system_prompt.as_deref(), &self.tools);
        tracing::debug!(model = %self.model, turns = history.len(), "generateContent");

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Network(format!("request timeout: {e}"))
                } else {
                    LlmError::Network(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Network(format!("failed to read response: {e}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|r| r.error.message)
                .unwrap_or(body);
            return Err(match status.as_u16() {
                401 | 403 => LlmError::Auth(message),
                429 => LlmError::RateLimited(message),
                code => LlmError::Api {
                    status: code,
                    message,
                },
            });
        }

        parse_response(&body)
    }
}

/// Gemini 后端：所有会话共享同一个 HTTP 客户端与工具声明
pub struct GeminiBackend {
    client: Arc<GeminiClient>,
}

impl GeminiBackend {
    pub fn new(settings: GeminiSettings, tools: Vec<ToolDeclaration>) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(format!("failed to build HTTP client: {e}")))?;
        let base = settings
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        let endpoint = format!("{base}/v1beta/models/{}:generateContent", settings.model);
        Ok(Self {
            client: Arc::new(GeminiClient {
                http,
                endpoint,
                api_key: settings.api_key,
                model: settings.model,
                system_prompt: settings.system_prompt,
                tools,
            }),
        })
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    async fn create_session(&self) -> Result<Box<dyn ChatSession>, LlmError> {
        Ok(Box::new(GeminiChat {
            id: uuid::Uuid::new_v4().to_string(),
            client: self.client.clone(),
            history: Vec::new(),
        }))
    }

    fn model(&self) -> &str {
        &self.client.model
    }
}

pub struct GeminiChat {
    id: String,
    client: Arc<GeminiClient>,
    history: Vec<Content>,
}

#[async_trait]
impl ChatSession for GeminiChat {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&mut self, parts: Vec<Part>) -> Result<ChatResponse, LlmError> {
        self.history.push(Content::user(parts));
        match self.client.generate(&self.history).await {
            Ok(response) => {
                self.history.push(response.content.clone());
                Ok(response)
            }
            Err(e) => {
                // 请求失败时撤回本轮 user 内容，保持历史一问一答
                self.history.pop();
                Err(e)
            }
        }
    }

    fn history(&self) -> &[Content] {
        &self.history
    }
}

fn build_request(
    history: &[Content],
    system_prompt: Option<&str>,
    tools: &[ToolDeclaration],
) -> GenerateRequest {
    GenerateRequest {
        contents: history.iter().map(WireContent::from).collect(),
        system_instruction: system_prompt.map(|text| WireContent {
            role: None,
            parts: vec![WirePart {
                text: Some(text.to_string()),
                ..WirePart::default()
            }],
        }),
        tools: if tools.is_empty() {
            None
        } else {
            Some(vec![WireTool {
                function_declarations: tools
                    .iter()
                    .map(|t| WireFunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            }])
        },
    }
}

/// 取第一个候选；没有候选或候选没有内容时得到零片段的 model 轮
fn parse_response(body: &str) -> Result<ChatResponse, LlmError> {
    let resp: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("{e}: {body}")))?;

    let candidate = resp.candidates.into_iter().next();
    let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
    let parts = candidate
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(WirePart::into_part).collect())
        .unwrap_or_default();
    let usage = resp
        .usage_metadata
        .map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
        })
        .unwrap_or_default();

    Ok(ChatResponse {
        content: Content::model(parts),
        finish_reason,
        usage,
    })
}

// Gemini wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

impl From<&Content> for WireContent {
    fn from(content: &Content) -> Self {
        let role = match content.role {
            Role::User => "user",
            Role::Model => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: content.parts.iter().map(WirePart::from).collect(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

impl WirePart {
    fn into_part(self) -> Option<Part> {
        if let Some(call) = self.function_call {
            return Some(Part::FunctionCall(FunctionCall {
                id: call.id,
                name: call.name,
                args: call.args,
            }));
        }
        if let Some(resp) = self.function_response {
            return Some(Part::FunctionResponse(FunctionResponse {
                id: resp.id,
                name: resp.name,
                response: resp.response,
            }));
        }
        self.text.map(Part::Text)
    }
}

impl From<&Part> for WirePart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text(text) => Self {
                text: Some(text.clone()),
                ..Self::default()
            },
            Part::FunctionCall(call) => Self {
                function_call: Some(WireFunctionCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    args: call.args.clone(),
                }),
                ..Self::default()
            },
            Part::FunctionResponse(resp) => Self {
                function_response: Some(WireFunctionResponse {
                    id: resp.id.clone(),
                    name: resp.name.clone(),
                    response: resp.response.clone(),
                }),
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool {
    function_declarations: Vec<WireFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct WireFunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_and_function_call() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Rolling now."},
                    {"functionCall": {"name": "roll_dice", "args": {"prompt": "1d20+4"}}}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 5, "totalTokenCount": 17}
        }"#;
        let resp = parse_response(body).unwrap();
        assert_eq!(resp.text(), "Rolling now.");
        let calls = resp.function_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "roll_dice");
        assert_eq!(calls[0].args["prompt"], "1d20+4");
        assert_eq!(resp.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(resp.usage.prompt_tokens, 12);
    }

    #[test]
    fn test_missing_candidates_yield_empty_model_turn() {
        let resp = parse_response(r#"{"promptFeedback": {"blockReason": "OTHER"}}"#).unwrap();
        assert_eq!(resp.content.role, Role::Model);
        assert!(resp.content.parts.is_empty());
        assert_eq!(resp.text(), "");

        let resp = parse_response(r#"{"candidates": [{"finishReason": "MALFORMED_FUNCTION_CALL"}]}"#).unwrap();
        assert!(resp.content.parts.is_empty());
    }

    #[test]
    fn test_request_serialization() {
        let call = FunctionCall {
            id: None,
            name: "chat_data".to_string(),
            args: serde_json::json!({"action": "show"}),
        };
        let history = vec![
            Content::user(vec![Part::text("hi")]),
            Content::model(vec![Part::FunctionCall(call.clone())]),
            Content::user(vec![Part::FunctionResponse(FunctionResponse::result(&call, "No chat data available"))]),
        ];
        let tools = vec![ToolDeclaration {
            name: "chat_data".to_string(),
            description: "store".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let request = build_request(&history, Some("be brief"), &tools);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["contents"][1]["parts"][0]["functionCall"]["name"], "chat_data");
        assert_eq!(
            json["contents"][2]["parts"][0]["functionResponse"]["response"]["result"],
            "No chat data available"
        );
        assert!(json["contents"][2]["parts"][0].get("text").is_none());
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(json["tools"][0]["functionDeclarations"][0]["name"], "chat_data");
    }
}
