use crate::llm::client::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use log::warn;
use std::str::FromStr;
use std::time::Duration;

/// Runtime settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantConfig {
    /// Bearer token for the model API. Model calls are disabled without it.
    pub github_token: Option<String>,
    pub model_endpoint: String,
    pub model_name: String,
    pub port: u16,
    /// Bound on a chat call.
    pub model_timeout: Duration,
    /// Bound on the extractor's model call before it falls back.
    pub extraction_timeout: Duration,
    pub retrieval_top_k: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            github_token: None,
            model_endpoint: DEFAULT_ENDPOINT.to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            port: 8000,
            model_timeout: Duration::from_secs(60),
            extraction_timeout: Duration::from_secs(90),
            retrieval_top_k: 3,
        }
    }
}

impl AssistantConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Self {
            github_token: get("GITHUB_TOKEN"),
            model_endpoint: get("MODEL_ENDPOINT").unwrap_or(defaults.model_endpoint),
            model_name: get("MODEL_NAME").unwrap_or(defaults.model_name),
            port: parse_or("PORT", get("PORT"), defaults.port),
            model_timeout: Duration::from_secs(parse_or(
                "MODEL_TIMEOUT_SECS",
                get("MODEL_TIMEOUT_SECS"),
                defaults.model_timeout.as_secs(),
            )),
            extraction_timeout: Duration::from_secs(parse_or(
                "EXTRACTION_TIMEOUT_SECS",
                get("EXTRACTION_TIMEOUT_SECS"),
                defaults.extraction_timeout.as_secs(),
            )),
            retrieval_top_k: parse_or("RETRIEVAL_TOP_K", get("RETRIEVAL_TOP_K"), defaults.retrieval_top_k),
        }
    }

    pub fn model_configured(&self) -> bool {
        self.github_token.is_some()
    }
}

fn parse_or<T: FromStr + std::fmt::Display>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
    }
}
