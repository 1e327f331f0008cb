//! Startup selection of one adapter per capability

use crate::config::{AiConfig, ProviderKind};
use crate::deepl::{DeeplTranslator, Translator};
use crate::error::{ProviderError, Result};
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;
use crate::provider::GenerationProvider;
use std::sync::Arc;

/// Adapters chosen from configuration, shared by all operations
#[derive(Clone)]
pub struct ProviderSet {
    pub text: Arc<dyn GenerationProvider>,
    pub image: Arc<dyn GenerationProvider>,
    pub audio: Arc<dyn GenerationProvider>,
    pub structured: Arc<dyn GenerationProvider>,
    pub translator: Arc<dyn Translator>,
}

impl ProviderSet {
    pub fn from_config(config: &AiConfig) -> Result<Self> {
        config.validate().map_err(ProviderError::ConfigError)?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ProviderError::ConfigError(e.to_string()))?;

        let build = |kind: ProviderKind| -> Arc<dyn GenerationProvider> {
            let credentials = config.credentials(kind);
            match kind {
                ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
                    client.clone(),
                    &credentials.base_url,
                    credentials.api_key.clone(),
                )),
                ProviderKind::Gemini => Arc::new(GeminiProvider::new(
                    client.clone(),
                    &credentials.base_url,
                    credentials.api_key.clone(),
                )),
            }
        };

        tracing::info!(
            "Generation providers: text={} image={} audio={} struct={}",
            config.text.provider,
            config.image.provider,
            config.audio.provider,
            config.structured.provider
        );

        Ok(Self {
            text: build(config.text.provider),
            image: build(config.image.provider),
            audio: build(config.audio.provider),
            structured: build(config.structured.provider),
            translator: Arc::new(DeeplTranslator::new(
                client.clone(),
                config.deepl.clone(),
                config.short_timeout(),
            )),
        })
    }

    /// Same provider for every capability
    pub fn uniform(provider: Arc<dyn GenerationProvider>, translator: Arc<dyn Translator>) -> Self {
        Self {
            text: provider.clone(),
            image: provider.clone(),
            audio: provider.clone(),
            structured: provider,
            translator,
        }
    }
}
