/// Pagetree AI Engine - Generation Provider Adapters
///
/// This crate hides the external text, image, structured-output, audio and
/// translation backends behind a single capability interface so the core
/// crate never talks to a vendor API directly.
///
/// # Features
///
/// - **Capability Interface**: `GenerationProvider` with `generate_text`,
///   `generate_image`, `generate_structured` and `transcribe_audio`
/// - **Adapters**: OpenAI-compatible and Gemini backends over `reqwest`
/// - **Startup Selection**: `ProviderSet::from_config` picks one adapter per
///   capability once, callers never choose a backend per call
/// - **Translation**: DeepL batch translation client
/// - **Captions**: WebVTT formatting for transcription segments
///
/// # Example
///
/// ```ignore
/// use pagetree_ai::{AiConfig, ProviderSet, TextRequest};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = AiConfig::from_env();
///     let providers = ProviderSet::from_config(&config)?;
///
///     let request = TextRequest::new(&config.text.model, "Write a haiku about trees");
///     let response = providers.text.generate_text(&request).await?;
///     println!("{}", response.text);
///
///     Ok(())
/// }
/// ```
pub mod captions;
pub mod config;
pub mod deepl;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod provider;
pub mod registry;

// Re-export main types
pub use captions::{format_timestamp, to_webvtt, Segment};
pub use config::{AiConfig, CapabilityConfig, DeeplConfig, ProviderCredentials, ProviderKind};
pub use deepl::{DeeplTranslator, Translator};
pub use error::{ProviderError, Result};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use provider::{
    Attachment, FinishReason, GeneratedImage, GenerationProvider, ImageRequest, ImageResponse,
    MediaKind, MediaSource, Message, ParameterKind, StructuredRequest, TextRequest, TextResponse,
    ToolCall, ToolChoice, ToolParameter, ToolSpec, Transcription, TranscriptionRequest,
};
pub use registry::ProviderSet;
