//! LLM integration.
//!
//! Supports:
//! - **Anthropic**: Messages API
//! - **OpenAI**: Chat Completions API
//!
//! Both speak plain HTTPS through `reqwest` and sit behind the
//! `LlmProvider` trait so tools never see a concrete backend.

pub mod anthropic;
pub mod openai;
pub mod provider;
#[cfg(test)]
pub(crate) mod stub;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use provider::*;

use std::str::FromStr;
use std::sync::Arc;

use crate::config::LlmSettings;
use crate::error::{ConfigError, Error};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Environment variable holding this backend's credential.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-sonnet-4-20250514",
            Self::OpenAi => "gpt-4o",
        }
    }
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        };
        write!(f, "{s}")
    }
}

impl FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "gpt" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "DOCFORGE_LLM_BACKEND".to_string(),
                message: format!("unsupported backend '{other}'"),
            }),
        }
    }
}

/// Create an LLM provider from configuration.
///
/// A missing credential is a configuration error; callers decide whether
/// that is fatal at startup or only for the jobs that need a provider.
pub fn create_provider(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, Error> {
    let api_key = settings
        .api_key
        .clone()
        .ok_or_else(|| ConfigError::MissingEnvVar(settings.backend.api_key_var().to_string()))?;

    let provider: Arc<dyn LlmProvider> = match settings.backend {
        LlmBackend::Anthropic => Arc::new(AnthropicProvider::new(
            api_key,
            &settings.model,
            settings.request_timeout,
        )?),
        LlmBackend::OpenAi => Arc::new(OpenAiProvider::new(
            api_key,
            &settings.model,
            settings.request_timeout,
        )?),
    };
    tracing::info!(backend = %settings.backend, model = %settings.model, "LLM provider ready");
    Ok(provider)
}
