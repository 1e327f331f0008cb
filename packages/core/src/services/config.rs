//! Service configuration
//!
//! Values come from defaults, optionally overridden by `CMS_*` environment
//! variables. Invalid numbers are ignored with a warning.

use crate::query::PageLimits;
use serde::{Deserialize, Serialize};

/// Element types the refine schema allows the model to emit
const DEFAULT_REFINE_TYPES: &[&str] = &["heading", "text", "article", "image-text", "cards", "hero"];

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CmsConfig {
    /// Versions kept per entity when pruning (effective version always kept)
    pub versions_retained: usize,

    pub max_page_size: u32,
    pub default_page_size: u32,

    /// Retries of a retryable transaction after its first attempt
    pub retry_attempts: usize,

    /// Storage disk of uploaded files
    pub storage_disk: String,

    pub agent_max_steps_manage: usize,
    pub agent_max_steps_synthesize: usize,

    pub refine_types: Vec<String>,

    /// Page languages offered to generation agents
    pub locales: Vec<String>,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            versions_retained: 10,
            max_page_size: 100,
            default_page_size: 100,
            retry_attempts: 3,
            storage_disk: "public".to_string(),
            agent_max_steps_manage: 5,
            agent_max_steps_synthesize: 10,
            refine_types: DEFAULT_REFINE_TYPES.iter().map(|t| t.to_string()).collect(),
            locales: vec!["en".to_string()],
        }
    }
}

impl CmsConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        fn parse<T: std::str::FromStr>(key: &str, value: Option<String>, target: &mut T) {
            if let Some(value) = value {
                match value.trim().parse() {
                    Ok(parsed) => *target = parsed,
                    Err(_) => tracing::warn!("Ignoring {}: '{}' is not a number", key, value),
                }
            }
        }

        parse("CMS_VERSIONS", get("CMS_VERSIONS"), &mut config.versions_retained);
        parse("CMS_MAX_PAGE_SIZE", get("CMS_MAX_PAGE_SIZE"), &mut config.max_page_size);
        parse("CMS_PAGE_SIZE", get("CMS_PAGE_SIZE"), &mut config.default_page_size);
        parse("CMS_RETRIES", get("CMS_RETRIES"), &mut config.retry_attempts);
        parse("CMS_MANAGE_STEPS", get("CMS_MANAGE_STEPS"), &mut config.agent_max_steps_manage);
        parse(
            "CMS_SYNTHESIZE_STEPS",
            get("CMS_SYNTHESIZE_STEPS"),
            &mut config.agent_max_steps_synthesize,
        );

        if let Some(disk) = get("CMS_DISK") {
            config.storage_disk = disk;
        }
        if let Some(types) = get("CMS_REFINE_TYPES") {
            config.refine_types = split_list(&types);
        }
        if let Some(locales) = get("CMS_LOCALES") {
            config.locales = split_list(&locales);
        }

        config.normalized()
    }

    /// Clamp values into their usable ranges
    pub fn normalized(mut self) -> Self {
        self.versions_retained = self.versions_retained.max(1);
        self.max_page_size = self.max_page_size.max(1);
        self.default_page_size = self.default_page_size.clamp(1, self.max_page_size);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.storage_disk.trim().is_empty() {
            return Err("storage disk must not be empty".to_string());
        }
        if self.refine_types.is_empty() {
            return Err("at least one refine element type is required".to_string());
        }
        if self.locales.is_empty() {
            return Err("at least one locale is required".to_string());
        }
        if self.agent_max_steps_manage == 0 || self.agent_max_steps_synthesize == 0 {
            return Err("agent step limits must be positive".to_string());
        }
        Ok(())
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_size: self.default_page_size,
            max_size: self.max_page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = CmsConfig::default();
        assert_eq!(config.versions_retained, 10);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.page_limits(), PageLimits::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_lookup_overrides_and_clamps() {
        let env: HashMap<&str, &str> = [
            ("CMS_VERSIONS", "0"),
            ("CMS_PAGE_SIZE", "500"),
            ("CMS_MAX_PAGE_SIZE", "50"),
            ("CMS_RETRIES", "abc"),
            ("CMS_DISK", "s3"),
            ("CMS_REFINE_TYPES", "heading, text,,"),
            ("CMS_LOCALES", "en,de, fr"),
        ]
        .into_iter()
        .collect();

        let config = CmsConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.versions_retained, 1);
        assert_eq!(config.default_page_size, 50);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.storage_disk, "s3");
        assert_eq!(config.refine_types, vec!["heading", "text"]);
        assert_eq!(config.locales, vec!["en", "de", "fr"]);
    }
}
