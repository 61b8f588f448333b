//! Scoring configuration.
//!
//! One `ScoringConfig` is built at process start (defaults, then an optional
//! TOML file, then environment overrides) and shared by reference with every
//! pipeline component. Nothing in the pipeline reads the environment directly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "RubricScorer";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the completion endpoint API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable overriding the completion endpoint base URL.
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "rubric_scorer=info,warn"
}

/// Application data directory (`~/RubricScorer/`), falling back to the
/// working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Directory holding one rubric TOML file per category.
pub fn rubrics_dir() -> PathBuf {
    app_data_dir().join("rubrics")
}

/// Directory receiving superseded rubric versions.
pub fn rubric_archive_dir() -> PathBuf {
    app_data_dir().join("rubrics_archive")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A model variant the selector may choose, with its context window size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVariant {
    pub name: String,
    pub max_tokens: usize,
}

impl ModelVariant {
    pub fn new(name: &str, max_tokens: usize) -> Self {
        Self {
            name: name.to_string(),
            max_tokens,
        }
    }
}

/// Retry policy for transient completion-endpoint failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each further attempt.
    pub base_delay_ms: u64,
    /// Uniform jitter window added to every delay.
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            jitter_min_ms: 1_000,
            jitter_max_ms: 3_000,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts. Used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
        }
    }
}

/// Completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    /// Never serialized back out; usually supplied through `OPENAI_API_KEY`.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    /// Tokens reserved for the model's reply when checking context fit.
    pub max_output_tokens: usize,
    /// Ask the endpoint for a JSON-object response.
    pub json_mode: bool,
    /// Candidate variants in priority order (smallest context first).
    pub model_variants: Vec<ModelVariant>,
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            request_timeout_secs: 120,
            temperature: 0.0,
            max_output_tokens: 2_000,
            json_mode: true,
            model_variants: vec![
                ModelVariant::new("gpt-4", 8_192),
                ModelVariant::new("gpt-4-turbo", 128_000),
            ],
            retry: RetryConfig::default(),
        }
    }
}

/// Prompt truncation parameters used when no variant fits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationConfig {
    /// Characters removed per excess token (estimation safety margin).
    pub chars_per_excess_token: f64,
    /// Below this many characters the reducible segment is considered gone.
    pub min_segment_chars: usize,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            chars_per_excess_token: 1.5,
            min_segment_chars: 5,
        }
    }
}

/// Complete configuration for one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Extensions accepted directly or inside a zip upload.
    pub allowed_extensions: Vec<String>,
    /// Extracted documents longer than this (in characters) are truncated.
    pub max_content_chars: usize,
    /// Run the cleaning pipeline on extracted text.
    pub clean_text: bool,
    /// Extraction worker count; `None` uses the available parallelism.
    pub extraction_workers: Option<usize>,
    pub rubric_dir: PathBuf,
    pub rubric_archive_dir: PathBuf,
    /// Custom prompt template file; the built-in template is used when absent.
    pub prompt_template_path: Option<PathBuf>,
    pub llm: LlmConfig,
    pub truncation: TruncationConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec![".hwp".into(), ".docx".into(), ".pdf".into()],
            max_content_chars: 40_000,
            clean_text: true,
            extraction_workers: None,
            rubric_dir: rubrics_dir(),
            rubric_archive_dir: rubric_archive_dir(),
            prompt_template_path: None,
            llm: LlmConfig::default(),
            truncation: TruncationConfig::default(),
        }
    }
}

impl ScoringConfig {
    /// Build the process configuration: defaults, optional file, environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.llm.base_url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model_variants.is_empty() {
            return Err(ConfigError::Invalid("at least one model variant is required".into()));
        }
        if let Some(v) = self
            .llm
            .model_variants
            .iter()
            .find(|v| v.max_tokens <= self.llm.max_output_tokens)
        {
            return Err(ConfigError::Invalid(format!(
                "model variant {} ({} tokens) cannot hold {} reserved output tokens",
                v.name, v.max_tokens, self.llm.max_output_tokens
            )));
        }
        if self.llm.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.llm.retry.jitter_min_ms > self.llm.retry.jitter_max_ms {
            return Err(ConfigError::Invalid("retry jitter window is inverted".into()));
        }
        if self.truncation.chars_per_excess_token < 1.0 {
            return Err(ConfigError::Invalid(
                "truncation.chars_per_excess_token must be >= 1.0".into(),
            ));
        }
        if self.max_content_chars == 0 {
            return Err(ConfigError::Invalid("max_content_chars must be positive".into()));
        }
        Ok(())
    }

    /// Worker count for the extraction phase.
    pub fn extraction_parallelism(&self) -> usize {
        self.extraction_workers
            .filter(|n| *n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
    }

    /// Whether `extension` (with leading dot) may be uploaded.
    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }
}
