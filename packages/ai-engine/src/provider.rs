//! Generation Provider Capability Interface
//!
//! Request and response shapes shared by every backend adapter. The adapters
//! translate these into the vendor wire formats; callers only ever see the
//! types defined here.

use crate::captions::Segment;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_TOKENS: u32 = 32768;

/// Capability interface implemented by each concrete provider
///
/// Adapters that lack a capability keep the default implementation, which
/// reports `ProviderError::Unsupported`.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider name used in logs and errors
    fn name(&self) -> &str;

    /// Single completion step, optionally offering tools to the model
    async fn generate_text(&self, request: &TextRequest) -> Result<TextResponse>;

    async fn generate_image(&self, _request: &ImageRequest) -> Result<ImageResponse> {
        Err(ProviderError::unsupported(self.name(), "image generation"))
    }

    /// Output constrained by the JSON schema in the request
    async fn generate_structured(&self, request: &StructuredRequest) -> Result<Value>;

    async fn transcribe_audio(&self, _request: &TranscriptionRequest) -> Result<Transcription> {
        Err(ProviderError::unsupported(self.name(), "audio transcription"))
    }
}

/// Kind of an attached media file, derived from the mime type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Document,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next().unwrap_or_default() {
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            _ => Self::Document,
        }
    }
}

/// Where the bytes of an attachment come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MediaSource {
    Url { url: String },
    Base64 { data: String },
    Storage { disk: String, path: String },
}

/// File handed to the model together with the prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: MediaKind,
    pub mime: String,
    #[serde(flatten)]
    pub source: MediaSource,
}

impl Attachment {
    /// Attachment for a stored file: remote paths stay URLs, others live on `disk`
    pub fn for_file(path: &str, mime: &str, disk: &str) -> Self {
        let source = if path.starts_with("http") {
            MediaSource::Url {
                url: path.to_string(),
            }
        } else {
            MediaSource::Storage {
                disk: disk.to_string(),
                path: path.to_string(),
            }
        };

        Self {
            kind: MediaKind::from_mime(mime),
            mime: mime.to_string(),
            source,
        }
    }

    /// Attachment carrying the file content inline
    pub fn inline(bytes: &[u8], mime: &str) -> Self {
        Self {
            kind: MediaKind::from_mime(mime),
            mime: mime.to_string(),
            source: MediaSource::Base64 {
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        }
    }
}

/// Tool parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    String,
    Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub description: String,
    pub kind: ParameterKind,
    pub required: bool,
}

/// Tool offered to the model during a text step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(
        mut self,
        name: &str,
        kind: ParameterKind,
        description: &str,
        required: bool,
    ) -> Self {
        self.parameters.push(ToolParameter {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required,
        });
        self
    }

    /// JSON schema of the parameter object
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let kind = match param.kind {
                ParameterKind::String => "string",
                ParameterKind::Number => "number",
            };
            properties.insert(
                param.name.clone(),
                json!({ "type": kind, "description": param.description }),
            );
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// How strongly the model is pushed towards calling tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    Any,
    None,
}

/// Tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// Conversation entry of a multi-step text exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<Attachment>,
    },
    Assistant {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
    pub max_tokens: u32,
    #[serde(skip, default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl TextRequest {
    pub fn new(model: &str, prompt: impl Into<String>) -> Self {
        Self {
            model: model.to_string(),
            system: None,
            messages: vec![Message::user(prompt)],
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        if let Some(Message::User {
            attachments: current,
            ..
        }) = self.messages.first_mut()
        {
            *current = attachments;
        }
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>, choice: ToolChoice) -> Self {
        self.tools = tools;
        self.tool_choice = choice;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Other,
}

/// Result of one text step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: Option<String>,
    /// Base64 encoded reference image for edit-capable models
    pub reference_image: Option<String>,
    #[serde(skip, default = "default_timeout")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub base64: Option<String>,
    pub url: Option<String>,
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageResponse {
    pub images: Vec<GeneratedImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub schema_name: String,
    pub schema: Value,
    pub max_tokens: u32,
    #[serde(skip, default = "default_timeout")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub model: String,
    pub audio: Vec<u8>,
    pub mime: String,
    #[serde(skip, default = "default_timeout")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub segments: Vec<Segment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/png"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("audio/mpeg"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Document);
    }

    #[test]
    fn test_attachment_for_remote_and_stored_files() {
        let remote = Attachment::for_file("https://example.com/a.jpg", "image/jpeg", "public");
        assert_eq!(
            remote.source,
            MediaSource::Url {
                url: "https://example.com/a.jpg".to_string()
            }
        );

        let stored = Attachment::for_file("cms/a.mp3", "audio/mpeg", "public");
        assert_eq!(stored.kind, MediaKind::Audio);
        assert!(matches!(stored.source, MediaSource::Storage { ref disk, .. } if disk == "public"));

        let inline = Attachment::inline(b"abc", "image/png");
        assert_eq!(
            inline.source,
            MediaSource::Base64 {
                data: "YWJj".to_string()
            }
        );
    }

    #[test]
    fn test_tool_parameters_schema() {
        let tool = ToolSpec::new("create-page", "Creates a page")
            .with_parameter("title", ParameterKind::String, "Page title", true)
            .with_parameter("parent_id", ParameterKind::Number, "Parent", false);

        let schema = tool.parameters_schema();
        assert_eq!(schema["properties"]["title"]["type"], "string");
        assert_eq!(schema["properties"]["parent_id"]["type"], "number");
        assert_eq!(schema["required"], json!(["title"]));
    }
}
