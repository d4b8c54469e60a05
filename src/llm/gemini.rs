//! Gemini API 客户端（generateContent REST）
//!
//! 每个实例对应一个模型层级；历史按 Gemini contents 格式回放，工具清单作为 functionDeclarations。
//! - Base URL: https://generativelanguage.googleapis.com/v1beta
//! - HTTP 429 或错误文本命中限流关键字 → RateLimited，由编排器切换下一层级

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::llm::tier::is_rate_limit_message;
use crate::llm::{LlmError, ModelClient, ModelRequest, ModelResponse};
use crate::memory::{ConversationTurn, ToolCallRequest, TurnContent};
use crate::tools::ToolManifest;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_PRIMARY: &str = "gemini-2.5-flash";

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelResponse, LlmError> {
        let body = build_request_body(request);
        tracing::debug!(model = %self.model, turns = request.history.len(), "gemini generateContent");

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        parse_generate_response(status, &text)
    }
}

/// 组装 generateContent 请求体
pub fn build_request_body(request: ModelRequest<'_>) -> Value {
    let mut body = json!({
        "systemInstruction": { "parts": [{ "text": request.system_instruction }] },
        "contents": to_contents(request.history),
    });
    if !request.manifest.is_empty() {
        body["tools"] = json!([{ "functionDeclarations": function_declarations(request.manifest) }]);
    }
    body
}

pub fn function_declarations(manifest: &ToolManifest) -> Vec<Value> {
    manifest
        .specs()
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            })
        })
        .collect()
}

/// 历史 → contents：用户文本为 user；模型文本与 functionCall 为 model；工具结果以 functionResponse 放在 user 中
pub fn to_contents(history: &[ConversationTurn]) -> Vec<Value> {
    history
        .iter()
        .map(|turn| match &turn.content {
            TurnContent::Text { text } => {
                let role = match turn.role {
                    crate::memory::Role::User => "user",
                    _ => "model",
                };
                json!({ "role": role, "parts": [{ "text": text }] })
            }
            TurnContent::ToolCall(call) => json!({
                "role": "model",
                "parts": [{ "functionCall": { "name": call.name, "args": call.arguments } }],
            }),
            TurnContent::ToolResult { name, result } => {
                let response = if result.success {
                    json!({ "result": result.output })
                } else {
                    json!({ "error": result.output, "error_kind": result.error_kind })
                };
                json!({
                    "role": "user",
                    "parts": [{ "functionResponse": { "name": name, "response": response } }],
                })
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// 解析 HTTP 状态与响应体；只采用首个 candidate 的首个 functionCall
pub fn parse_generate_response(status: u16, body: &str) -> Result<ModelResponse, LlmError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|e| format!("{} {}", e.error.status, e.error.message).trim().to_string())
            .unwrap_or_else(|_| body.chars().take(500).collect());
        if status == 429 || is_rate_limit_message(&message) {
            return Ok(ModelResponse::RateLimited { message });
        }
        return Err(LlmError::ApiError { status, message });
    }

    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
    let candidate = parsed.candidates.into_iter().next().ok_or(LlmError::EmptyResponse)?;
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let mut texts = Vec::new();
    for part in parts {
        if let Some(call) = part.function_call {
            return Ok(ModelResponse::ToolCall(ToolCallRequest {
                name: call.name,
                arguments: call.args.unwrap_or_default(),
            }));
        }
        if let Some(text) = part.text {
            texts.push(text);
        }
    }

    let text = texts.concat();
    if text.trim().is_empty() {
        tracing::warn!(finish_reason = ?candidate.finish_reason, "gemini returned no text");
        return Err(LlmError::EmptyResponse);
    }
    Ok(ModelResponse::FinalText(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolErrorKind, ToolResult, ToolSpec};

    #[test]
    fn test_parse_function_call() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[
            {"functionCall":{"name":"get_logs","args":{"tail":20}}}]},"finishReason":"STOP"}]}"#;
        let r = parse_generate_response(200, body).unwrap();
        match r {
            ModelResponse::ToolCall(call) => {
                assert_eq!(call.name, "get_logs");
                assert_eq!(call.arguments.get("tail"), Some(&json!(20)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_text_parts_concatenated() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"You have 2 "},{"text":"containers."}]}}]}"#;
        assert_eq!(
            parse_generate_response(200, body).unwrap(),
            ModelResponse::FinalText("You have 2 containers.".into())
        );
    }

    #[test]
    fn test_rate_limit_by_status_and_by_message() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            parse_generate_response(429, body).unwrap(),
            ModelResponse::RateLimited { .. }
        ));
        let body = r#"{"error":{"code":503,"message":"Please retry in 30s","status":"UNAVAILABLE"}}"#;
        assert!(matches!(
            parse_generate_response(503, body).unwrap(),
            ModelResponse::RateLimited { .. }
        ));
    }

    #[test]
    fn test_other_errors_are_fatal() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        let err = parse_generate_response(400, body).unwrap_err();
        assert_eq!(
            err,
            LlmError::ApiError {
                status: 400,
                message: "INVALID_ARGUMENT API key not valid".into()
            }
        );
        assert_eq!(
            parse_generate_response(200, r#"{"candidates":[]}"#).unwrap_err(),
            LlmError::EmptyResponse
        );
        assert_eq!(
            parse_generate_response(200, r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap_err(),
            LlmError::EmptyResponse
        );
    }

    #[test]
    fn test_history_mapping() {
        let history = vec![
            ConversationTurn::user("list containers"),
            ConversationTurn::tool_call(ToolCallRequest::new("list_containers", json!({}))),
            ConversationTurn::tool_result("list_containers", ToolResult::ok("web, db")),
            ConversationTurn::tool_result("get_logs", ToolResult::unknown_tool("get_logs")),
            ConversationTurn::model("done"),
        ];
        let contents = to_contents(&history);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["name"], "list_containers");
        assert_eq!(contents[2]["parts"][0]["functionResponse"]["response"]["result"], "web, db");
        assert_eq!(
            contents[3]["parts"][0]["functionResponse"]["response"]["error_kind"],
            json!(ToolErrorKind::UnknownTool)
        );
        assert_eq!(contents[4]["role"], "model");
    }

    #[test]
    fn test_request_body_includes_declarations() {
        let manifest = ToolManifest::new(vec![ToolSpec {
            name: "list_containers".into(),
            description: "List".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }]);
        let history = vec![ConversationTurn::user("hi")];
        let body = build_request_body(ModelRequest {
            system_instruction: "be brief",
            history: &history,
            manifest: &manifest,
        });
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "list_containers");

        let empty = ToolManifest::default();
        let body = build_request_body(ModelRequest {
            system_instruction: "",
            history: &history,
            manifest: &empty,
        });
        assert!(body.get("tools").is_none());
    }
}
