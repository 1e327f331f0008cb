/// Error types for the generation provider adapters
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider '{provider}' does not support {capability}")]
    Unsupported {
        provider: String,
        capability: &'static str,
    },

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider '{provider}' returned status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl ProviderError {
    pub fn unsupported(provider: impl Into<String>, capability: &'static str) -> Self {
        Self::Unsupported {
            provider: provider.into(),
            capability,
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Convert a transport error, keeping timeouts distinguishable
    pub fn from_transport(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Request(error.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
