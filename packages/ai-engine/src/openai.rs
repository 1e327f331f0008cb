//! OpenAI-compatible provider adapter
//!
//! Covers chat completions (text + tool calls), JSON-schema structured output,
//! image generation and Whisper-style transcription.

use crate::captions::Segment;
use crate::error::{ProviderError, Result};
use crate::provider::{
    Attachment, FinishReason, GeneratedImage, GenerationProvider, ImageRequest, ImageResponse,
    MediaKind, MediaSource, Message, StructuredRequest, TextRequest, TextResponse, ToolCall,
    ToolChoice, Transcription, TranscriptionRequest,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "openai";

#[derive(Debug, Deserialize)]
struct ChatFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<Segment>,
}

/// Adapter for the OpenAI REST API (and compatible servers)
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    pub fn new(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn post_json(&self, path: &str, payload: &Value, timeout: Duration) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let started = Instant::now();

        let response = self
            .authorized(self.client.post(&url))
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, timeout))?;

        let body = read_body(response, timeout).await?;

        tracing::debug!(
            "openai {} completed in {}ms",
            path,
            started.elapsed().as_millis()
        );

        Ok(body)
    }

    fn chat_messages(request: &TextRequest) -> Vec<Value> {
        let mut messages = Vec::new();

        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }

        for message in &request.messages {
            messages.push(match message {
                Message::User { text, attachments } if attachments.is_empty() => {
                    json!({ "role": "user", "content": text })
                }
                Message::User { text, attachments } => {
                    let mut parts = vec![json!({ "type": "text", "text": text })];
                    parts.extend(attachments.iter().filter_map(image_part));
                    json!({ "role": "user", "content": parts })
                }
                Message::Assistant { text, tool_calls } if tool_calls.is_empty() => {
                    json!({ "role": "assistant", "content": text })
                }
                Message::Assistant { text, tool_calls } => {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": Value::Object(call.arguments.clone()).to_string(),
                                }
                            })
                        })
                        .collect();
                    json!({ "role": "assistant", "content": text, "tool_calls": calls })
                }
                Message::Tool {
                    call_id, content, ..
                } => {
                    json!({ "role": "tool", "tool_call_id": call_id, "content": content })
                }
            });
        }

        messages
    }
}

/// Only images can be inlined into chat messages
fn image_part(attachment: &Attachment) -> Option<Value> {
    if attachment.kind != MediaKind::Image {
        tracing::warn!("openai: skipping unsupported {:?} attachment", attachment.kind);
        return None;
    }

    match &attachment.source {
        MediaSource::Url { url } => Some(json!({ "type": "image_url", "image_url": { "url": url } })),
        MediaSource::Base64 { data } => Some(json!({
            "type": "image_url",
            "image_url": { "url": format!("data:{};base64,{}", attachment.mime, data) }
        })),
        MediaSource::Storage { path, .. } => {
            tracing::warn!("openai: stored file '{}' must be inlined before sending", path);
            None
        }
    }
}

async fn read_body(response: reqwest::Response, timeout: Duration) -> Result<Value> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            provider: PROVIDER_NAME.to_string(),
            status: status.as_u16(),
            body: truncate(&body, 320),
        });
    }

    response
        .json()
        .await
        .map_err(|e| match ProviderError::from_transport(e, timeout) {
            ProviderError::Request(msg) => ProviderError::invalid_response(msg),
            other => other,
        })
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect::<String>() + "..."
    }
}

fn finish_reason(value: Option<&str>) -> FinishReason {
    match value {
        Some("stop") | None => FinishReason::Stop,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("length") => FinishReason::Length,
        Some(_) => FinishReason::Other,
    }
}

fn parse_chat(body: Value) -> Result<ChatChoice> {
    let response: ChatResponse = serde_json::from_value(body)
        .map_err(|e| ProviderError::invalid_response(format!("chat completion: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::invalid_response("chat completion without choices"))
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate_text(&self, request: &TextRequest) -> Result<TextResponse> {
        let mut payload = json!({
            "model": request.model,
            "messages": Self::chat_messages(request),
            "max_tokens": request.max_tokens,
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters_schema(),
                        }
                    })
                })
                .collect();

            payload["tools"] = Value::Array(tools);
            payload["tool_choice"] = json!(match request.tool_choice {
                ToolChoice::Auto => "auto",
                ToolChoice::Any => "required",
                ToolChoice::None => "none",
            });
        }

        let body = self
            .post_json("/chat/completions", &payload, request.timeout)
            .await?;
        let choice = parse_chat(body)?;

        let mut tool_calls = Vec::with_capacity(choice.message.tool_calls.len());
        for call in choice.message.tool_calls {
            let arguments = if call.function.arguments.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str::<Map<String, Value>>(&call.function.arguments).map_err(
                    |e| {
                        ProviderError::invalid_response(format!(
                            "arguments of tool '{}': {}",
                            call.function.name, e
                        ))
                    },
                )?
            };

            tool_calls.push(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            });
        }

        Ok(TextResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason: finish_reason(choice.finish_reason.as_deref()),
        })
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse> {
        let mut payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "n": 1,
        });

        if let Some(size) = &request.size {
            payload["size"] = json!(size);
        }

        // gpt-image models always answer with base64 and reject the parameter
        if !request.model.starts_with("gpt-image") {
            payload["response_format"] = json!("b64_json");
        }

        let body = self
            .post_json("/images/generations", &payload, request.timeout)
            .await?;
        let response: ImagesResponse = serde_json::from_value(body)
            .map_err(|e| ProviderError::invalid_response(format!("image generation: {}", e)))?;

        Ok(ImageResponse {
            images: response
                .data
                .into_iter()
                .map(|image| GeneratedImage {
                    base64: image.b64_json,
                    url: image.url,
                    revised_prompt: image.revised_prompt,
                })
                .collect(),
        })
    }

    async fn generate_structured(&self, request: &StructuredRequest) -> Result<Value> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let payload = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                }
            }
        });

        let body = self
            .post_json("/chat/completions", &payload, request.timeout)
            .await?;
        let choice = parse_chat(body)?;
        let content = choice
            .message
            .content
            .ok_or_else(|| ProviderError::invalid_response("structured response without content"))?;

        serde_json::from_str(&content)
            .map_err(|e| ProviderError::invalid_response(format!("structured content: {}", e)))
    }

    async fn transcribe_audio(&self, request: &TranscriptionRequest) -> Result<Transcription> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let file = reqwest::multipart::Part::bytes(request.audio.clone())
            .file_name("audio")
            .mime_str(&request.mime)
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("model", request.model.clone())
            .text("response_format", "verbose_json")
            .part("file", file);

        let response = self
            .authorized(self.client.post(&url))
            .timeout(request.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, request.timeout))?;

        let body = read_body(response, request.timeout).await?;
        let transcription: VerboseTranscription = serde_json::from_value(body)
            .map_err(|e| ProviderError::invalid_response(format!("transcription: {}", e)))?;

        Ok(Transcription {
            text: transcription.text,
            segments: transcription.segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    #[test]
    fn test_chat_messages_with_tool_round_trip() {
        let mut request = TextRequest::new("gpt-4o", "Create a page").with_system("You manage pages");
        let mut arguments = Map::new();
        arguments.insert("title".to_string(), json!("Home"));
        request.messages.push(Message::Assistant {
            text: String::new(),
            tool_calls: vec![ToolCall {
                id: "call_1".to_string(),
                name: "create-page".to_string(),
                arguments,
            }],
        });
        request.messages.push(Message::Tool {
            call_id: "call_1".to_string(),
            name: "create-page".to_string(),
            content: "{}".to_string(),
        });

        let messages = OpenAiProvider::chat_messages(&request);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "create-page");
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"title":"Home"}"#
        );
        assert_eq!(messages[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(finish_reason(Some("tool_calls")), FinishReason::ToolCalls);
        assert_eq!(finish_reason(Some("length")), FinishReason::Length);
        assert_eq!(finish_reason(None), FinishReason::Stop);
        assert_eq!(finish_reason(Some("content_filter")), FinishReason::Other);
    }

    #[test]
    fn test_truncate_long_bodies() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
