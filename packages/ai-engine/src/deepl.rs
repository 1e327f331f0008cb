/// DeepL batch translation client
use crate::config::DeeplConfig;
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Translation seam used by the core crate
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `texts` into `target`, preserving their order
    async fn translate(
        &self,
        texts: &[String],
        target: &str,
        source: Option<&str>,
        context: Option<&str>,
    ) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<Translation>,
}

pub struct DeeplTranslator {
    client: Client,
    config: DeeplConfig,
    timeout: Duration,
}

impl DeeplTranslator {
    pub fn new(client: Client, config: DeeplConfig, timeout: Duration) -> Self {
        Self {
            client,
            config,
            timeout,
        }
    }

    fn payload(
        texts: &[String],
        target: &str,
        source: Option<&str>,
        context: Option<&str>,
    ) -> serde_json::Value {
        let mut payload = json!({
            "text": texts,
            "target_lang": target.to_uppercase(),
            "ignore_tags": ["x"],
            "tag_handling": "xml",
            "preserve_formatting": true,
            "model_type": "prefer_quality_optimized",
        });

        if let Some(source) = source.filter(|s| !s.is_empty()) {
            payload["source_lang"] = json!(source.to_uppercase());
        }
        if let Some(context) = context.filter(|c| !c.is_empty()) {
            payload["context"] = json!(context);
        }

        payload
    }
}

#[async_trait]
impl Translator for DeeplTranslator {
    async fn translate(
        &self,
        texts: &[String],
        target: &str,
        source: Option<&str>,
        context: Option<&str>,
    ) -> Result<Vec<String>> {
        if texts.is_empty() {
            return Err(ProviderError::Request("texts must not be empty".to_string()));
        }
        if target.trim().is_empty() {
            return Err(ProviderError::Request("target language is required".to_string()));
        }
        let key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::ConfigError("DeepL API key is missing".to_string()))?;

        let response = self
            .client
            .post(&self.config.url)
            .timeout(self.timeout)
            .header("Authorization", format!("DeepL-Auth-Key {}", key))
            .json(&Self::payload(texts, target, source, context))
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: "deepl".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::invalid_response(format!("deepl: {}", e)))?;

        tracing::debug!("deepl translated {} texts to {}", body.translations.len(), target);

        Ok(body.translations.into_iter().map(|t| t.text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_uppercases_languages() {
        let texts = vec!["Hallo".to_string()];
        let payload = DeeplTranslator::payload(&texts, "en-us", Some("de"), Some("greeting"));

        assert_eq!(payload["target_lang"], "EN-US");
        assert_eq!(payload["source_lang"], "DE");
        assert_eq!(payload["context"], "greeting");
        assert_eq!(payload["tag_handling"], "xml");
    }

    #[test]
    fn test_payload_omits_empty_source() {
        let texts = vec!["Hi".to_string()];
        let payload = DeeplTranslator::payload(&texts, "de", Some(""), None);
        assert!(payload.get("source_lang").is_none());
        assert!(payload.get("context").is_none());
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let translator = DeeplTranslator::new(
            Client::new(),
            DeeplConfig {
                api_key: None,
                url: "http://localhost/v2/translate".to_string(),
            },
            Duration::from_secs(1),
        );

        let result = translator
            .translate(&["Hi".to_string()], "de", None, None)
            .await;
        assert!(matches!(result, Err(ProviderError::ConfigError(_))));
    }
}
