//! Gemini provider adapter
//!
//! Text with function calling and schema constrained output through
//! `generateContent`. Image generation and transcription are not offered.

use crate::error::{ProviderError, Result};
use crate::provider::{
    Attachment, FinishReason, GenerationProvider, MediaSource, Message, StructuredRequest,
    TextRequest, TextResponse, ToolCall, ToolChoice,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "gemini";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiProvider {
    pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn generate(&self, model: &str, payload: &Value, timeout: Duration) -> Result<Candidate> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let started = Instant::now();

        let mut builder = self.client.post(&url).timeout(timeout).json(payload);
        if let Some(key) = &self.api_key {
            builder = builder.header("x-goog-api-key", key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER_NAME.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("generateContent: {}", e)))?;

        tracing::debug!(
            "gemini {} completed in {}ms",
            model,
            started.elapsed().as_millis()
        );

        body.candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response("generateContent without candidates"))
    }
}

fn attachment_part(attachment: &Attachment) -> Option<Value> {
    match &attachment.source {
        MediaSource::Url { url } => Some(json!({
            "fileData": { "mimeType": attachment.mime, "fileUri": url }
        })),
        MediaSource::Base64 { data } => Some(json!({
            "inlineData": { "mimeType": attachment.mime, "data": data }
        })),
        MediaSource::Storage { path, .. } => {
            tracing::warn!("gemini: stored file '{}' must be inlined before sending", path);
            None
        }
    }
}

fn contents(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| match message {
            Message::User { text, attachments } => {
                let mut parts = vec![json!({ "text": text })];
                parts.extend(attachments.iter().filter_map(attachment_part));
                json!({ "role": "user", "parts": parts })
            }
            Message::Assistant { text, tool_calls } => {
                let mut parts = Vec::new();
                if !text.is_empty() {
                    parts.push(json!({ "text": text }));
                }
                for call in tool_calls {
                    parts.push(json!({
                        "functionCall": { "name": call.name, "args": call.arguments }
                    }));
                }
                json!({ "role": "model", "parts": parts })
            }
            Message::Tool { name, content, .. } => {
                let response = serde_json::from_str::<Value>(content)
                    .ok()
                    .filter(Value::is_object)
                    .unwrap_or_else(|| json!({ "result": content }));
                json!({
                    "role": "user",
                    "parts": [{ "functionResponse": { "name": name, "response": response } }]
                })
            }
        })
        .collect()
}

fn finish_reason(value: Option<&str>, has_calls: bool) -> FinishReason {
    if has_calls {
        return FinishReason::ToolCalls;
    }
    match value {
        Some("STOP") | None => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some(_) => FinishReason::Other,
    }
}

fn collect_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .concat()
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate_text(&self, request: &TextRequest) -> Result<TextResponse> {
        let mut payload = json!({
            "contents": contents(&request.messages),
            "generationConfig": { "maxOutputTokens": request.max_tokens },
        });

        if let Some(system) = &request.system {
            payload["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters_schema(),
                    })
                })
                .collect();

            payload["tools"] = json!([{ "functionDeclarations": declarations }]);
            payload["toolConfig"] = json!({
                "functionCallingConfig": {
                    "mode": match request.tool_choice {
                        ToolChoice::Auto => "AUTO",
                        ToolChoice::Any => "ANY",
                        ToolChoice::None => "NONE",
                    }
                }
            });
        }

        let candidate = self
            .generate(&request.model, &payload, request.timeout)
            .await?;

        // Gemini has no call ids, so they are derived from the position
        let tool_calls: Vec<ToolCall> = candidate
            .content
            .parts
            .iter()
            .filter_map(|part| part.function_call.as_ref())
            .enumerate()
            .map(|(idx, call)| ToolCall {
                id: format!("call_{}", idx),
                name: call.name.clone(),
                arguments: call.args.clone(),
            })
            .collect();

        Ok(TextResponse {
            text: collect_text(&candidate.content.parts),
            finish_reason: finish_reason(candidate.finish_reason.as_deref(), !tool_calls.is_empty()),
            tool_calls,
        })
    }

    async fn generate_structured(&self, request: &StructuredRequest) -> Result<Value> {
        let mut payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "responseMimeType": "application/json",
                "responseSchema": request.schema,
            },
        });

        if let Some(system) = &request.system {
            payload["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let candidate = self
            .generate(&request.model, &payload, request.timeout)
            .await?;
        let text = collect_text(&candidate.content.parts);

        serde_json::from_str(&text)
            .map_err(|e| ProviderError::invalid_response(format!("structured content: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MediaKind;

    #[test]
    fn test_tool_result_becomes_function_response() {
        let messages = vec![Message::Tool {
            call_id: "call_0".to_string(),
            name: "get-locales".to_string(),
            content: r#"["en","de"]"#.to_string(),
        }];

        let out = contents(&messages);
        let response = &out[0]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "get-locales");
        // Non-object results are wrapped
        assert_eq!(response["response"]["result"], r#"["en","de"]"#);
    }

    #[test]
    fn test_inline_attachment() {
        let attachment = Attachment {
            kind: MediaKind::Image,
            mime: "image/png".to_string(),
            source: MediaSource::Base64 {
                data: "AAAA".to_string(),
            },
        };

        let part = attachment_part(&attachment).unwrap();
        assert_eq!(part["inlineData"]["mimeType"], "image/png");
    }

    #[test]
    fn test_finish_reason_prefers_tool_calls() {
        assert_eq!(finish_reason(Some("STOP"), true), FinishReason::ToolCalls);
        assert_eq!(finish_reason(Some("MAX_TOKENS"), false), FinishReason::Length);
        assert_eq!(finish_reason(Some("SAFETY"), false), FinishReason::Other);
    }
}
