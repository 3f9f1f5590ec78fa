//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmBackend;

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub backend: LlmBackend,
    /// Absent credentials are only reported when a job needs the provider.
    pub api_key: Option<SecretString>,
    pub model: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Anthropic,
            api_key: None,
            model: LlmBackend::Anthropic.default_model().to_string(),
            max_tokens: 4096,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Job retention settings.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Terminal jobs older than this are evicted by the sweeper.
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),             // 1 hour
            sweep_interval: Duration::from_secs(300),   // 5 minutes
        }
    }
}

/// Workflow executor settings.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub definitions_dir: PathBuf,
    pub step_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            definitions_dir: PathBuf::from("./workflows"),
            step_timeout: Duration::from_secs(600), // 10 minutes
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub log_dir: Option<PathBuf>,
    pub llm: LlmSettings,
    pub jobs: JobConfig,
    pub workflows: WorkflowConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            log_dir: None,
            llm: LlmSettings::default(),
            jobs: JobConfig::default(),
            workflows: WorkflowConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `DOCFORGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend = match lookup("DOCFORGE_LLM_BACKEND") {
            Some(raw) => raw.parse::<LlmBackend>()?,
            None => LlmBackend::Anthropic,
        };
        let api_key = lookup(backend.api_key_var())
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);
        let model = lookup("DOCFORGE_MODEL").unwrap_or_else(|| backend.default_model().to_string());

        let llm = LlmSettings {
            backend,
            api_key,
            model,
            max_tokens: parse_or(&lookup, "DOCFORGE_MAX_TOKENS", defaults.llm.max_tokens)?,
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DOCFORGE_LLM_TIMEOUT_SECS",
                defaults.llm.request_timeout.as_secs(),
            )?),
        };

        let jobs = JobConfig {
            ttl: Duration::from_secs(parse_or(
                &lookup,
                "DOCFORGE_JOB_TTL_SECS",
                defaults.jobs.ttl.as_secs(),
            )?),
            sweep_interval: Duration::from_secs(parse_or(
                &lookup,
                "DOCFORGE_SWEEP_INTERVAL_SECS",
                defaults.jobs.sweep_interval.as_secs(),
            )?),
        };

        let workflows = WorkflowConfig {
            definitions_dir: lookup("DOCFORGE_WORKFLOWS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workflows.definitions_dir),
            step_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DOCFORGE_STEP_TIMEOUT_SECS",
                defaults.workflows.step_timeout.as_secs(),
            )?),
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "DOCFORGE_POLL_INTERVAL_MS",
                defaults.workflows.poll_interval.as_millis() as u64,
            )?),
        };

        if jobs.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "DOCFORGE_SWEEP_INTERVAL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if workflows.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "DOCFORGE_POLL_INTERVAL_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            port: parse_or(&lookup, "DOCFORGE_PORT", defaults.port)?,
            log_dir: lookup("DOCFORGE_LOG_DIR").map(PathBuf::from),
            llm,
            jobs,
            workflows,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
        None => Ok(default),
    }
}
