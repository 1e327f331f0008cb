/// Configuration for the generation providers
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_DEEPL_URL: &str = "https://api-free.deepl.com/v2/translate";

/// Backend implementing one or more capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(ProviderError::ConfigError(format!(
                "unknown provider '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// Provider and model used for a single capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub provider: ProviderKind,
    pub model: String,
}

impl CapabilityConfig {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// API key and endpoint of one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    pub base_url: String,
}

/// DeepL translation endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeeplConfig {
    pub api_key: Option<String>,
    pub url: String,
}

/// Configuration for all generation capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Freeform text and tool-using agent runs
    pub text: CapabilityConfig,

    /// Image generation
    pub image: CapabilityConfig,

    /// Audio transcription
    pub audio: CapabilityConfig,

    /// Structured (JSON schema constrained) output
    pub structured: CapabilityConfig,

    /// Upper bound of generated tokens per call
    pub max_tokens: u32,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Operation timeout for compose, imagine and transcribe
    pub short_timeout_secs: u64,

    /// Operation timeout for refine and agent runs
    pub long_timeout_secs: u64,

    pub openai: ProviderCredentials,
    pub gemini: ProviderCredentials,
    pub deepl: DeeplConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            text: CapabilityConfig::new(ProviderKind::Gemini, "gemini-2.5-flash"),
            image: CapabilityConfig::new(ProviderKind::OpenAi, "dall-e-3"),
            audio: CapabilityConfig::new(ProviderKind::OpenAi, "whisper-1"),
            structured: CapabilityConfig::new(ProviderKind::Gemini, "gemini-2.5-flash"),
            max_tokens: 32768,
            connect_timeout_secs: 10,
            short_timeout_secs: 60,
            long_timeout_secs: 180,
            openai: ProviderCredentials {
                api_key: None,
                base_url: DEFAULT_OPENAI_URL.to_string(),
            },
            gemini: ProviderCredentials {
                api_key: None,
                base_url: DEFAULT_GEMINI_URL.to_string(),
            },
            deepl: DeeplConfig {
                api_key: None,
                url: DEFAULT_DEEPL_URL.to_string(),
            },
        }
    }
}

impl AiConfig {
    /// Build the configuration from `PAGETREE_AI_*` and vendor key variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    ///
    /// Unknown provider names fall back to the default of that capability.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        for (prefix, capability) in [
            ("TEXT", &mut config.text),
            ("IMAGE", &mut config.image),
            ("AUDIO", &mut config.audio),
            ("STRUCT", &mut config.structured),
        ] {
            if let Some(provider) = get(&format!("PAGETREE_AI_{}", prefix)) {
                match provider.parse() {
                    Ok(kind) => capability.provider = kind,
                    Err(e) => tracing::warn!("Ignoring PAGETREE_AI_{}: {}", prefix, e),
                }
            }
            if let Some(model) = get(&format!("PAGETREE_AI_{}_MODEL", prefix)) {
                capability.model = model;
            }
        }

        if let Some(max) = get("PAGETREE_AI_MAXTOKEN").and_then(|v| v.parse().ok()) {
            config.max_tokens = max;
        }

        config.openai.api_key = get("OPENAI_API_KEY");
        if let Some(url) = get("OPENAI_BASE_URL") {
            config.openai.base_url = url;
        }

        config.gemini.api_key = get("GEMINI_API_KEY");
        if let Some(url) = get("GEMINI_BASE_URL") {
            config.gemini.base_url = url;
        }

        config.deepl.api_key = get("DEEPL_API_KEY");
        if let Some(url) = get("DEEPL_URL") {
            config.deepl.url = url;
        }

        config
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn short_timeout(&self) -> Duration {
        Duration::from_secs(self.short_timeout_secs)
    }

    pub fn long_timeout(&self) -> Duration {
        Duration::from_secs(self.long_timeout_secs)
    }

    /// Credentials of the given provider
    pub fn credentials(&self, kind: ProviderKind) -> &ProviderCredentials {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        for (name, capability) in [
            ("text", &self.text),
            ("image", &self.image),
            ("audio", &self.audio),
            ("struct", &self.structured),
        ] {
            if capability.model.trim().is_empty() {
                return Err(format!("{} model cannot be empty", name));
            }
        }

        if self.max_tokens == 0 {
            return Err("max_tokens must be greater than 0".to_string());
        }

        if self.connect_timeout_secs == 0 || self.short_timeout_secs == 0 {
            return Err("timeouts must be greater than 0".to_string());
        }

        if self.long_timeout_secs < self.short_timeout_secs {
            return Err("long timeout cannot be shorter than the short timeout".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = AiConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.text.provider, ProviderKind::Gemini);
        assert_eq!(config.image.model, "dall-e-3");
        assert_eq!(config.audio.model, "whisper-1");
        assert_eq!(config.long_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PAGETREE_AI_TEXT", "openai"),
            ("PAGETREE_AI_TEXT_MODEL", "gpt-4o-mini"),
            ("PAGETREE_AI_MAXTOKEN", "1024"),
            ("DEEPL_API_KEY", "secret"),
        ]
        .into_iter()
        .collect();

        let config = AiConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.text.provider, ProviderKind::OpenAi);
        assert_eq!(config.text.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 1024);
        assert_eq!(config.deepl.api_key.as_deref(), Some("secret"));
        // Untouched capabilities keep their defaults
        assert_eq!(config.structured.provider, ProviderKind::Gemini);
    }

    #[test]
    fn test_unknown_provider_keeps_default() {
        let config = AiConfig::from_lookup(|k| {
            (k == "PAGETREE_AI_IMAGE").then(|| "midjourney".to_string())
        });
        assert_eq!(config.image.provider, ProviderKind::OpenAi);
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let mut config = AiConfig::default();
        config.structured.model = String::new();
        assert!(config.validate().is_err());
    }
}
