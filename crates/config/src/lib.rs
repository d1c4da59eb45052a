//! Configuration loading, validation, and management for PromptChain.
//!
//! Loads configuration from `~/.promptchain/config.toml` with environment
//! variable overrides. Validates all settings at startup. The API key lives
//! in this struct and is handed to the provider constructor; nothing here
//! writes to the process environment.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.promptchain/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per completion (none = provider default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_max_tokens: Option<u32>,

    /// Per-request timeout for completion calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Stage memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// The prompt chain to run
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_provider() -> String {
    "groq".into()
}
fn default_model() -> String {
    "llama3-70b-8192".into()
}
fn default_temperature() -> f32 {
    0.8
}
fn default_request_timeout_secs() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("memory", &self.memory)
            .field("providers", &self.providers)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// How long stage transcripts live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryModeConfig {
    /// Cleared at the start of every run
    #[default]
    Scoped,
    /// Kept for the lifetime of the process
    Persistent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub mode: MemoryModeConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// A sequential prompt chain described as data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name (used in logs and events)
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Variables the caller must supply
    pub inputs: Vec<String>,

    /// Variables surfaced in the result (besides the inputs)
    pub outputs: Vec<String>,

    /// Surface every variable, not just inputs and outputs
    #[serde(default)]
    pub return_all: bool,

    /// Stages in execution order
    pub stages: Vec<StageConfig>,
}

fn default_pipeline_name() -> String {
    "celebrity_search".into()
}

/// One prompt-render-then-complete step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Unique stage name
    pub name: String,

    /// Prompt template with `{variable}` placeholders
    pub template: String,

    /// Variable the completion is stored under
    pub output_key: String,

    /// Variable recorded as the "question" in this stage's memory
    /// (defaults to the template's first variable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_key: Option<String>,

    /// Name under which this stage's transcript is exposed
    #[serde(default = "default_memory_key")]
    pub memory_key: String,

    /// Model override for this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Temperature override for this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max tokens override for this stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_memory_key() -> String {
    "history".into()
}

impl StageConfig {
    fn new(name: &str, template: &str, output_key: &str, input_key: &str, memory_key: &str) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            output_key: output_key.into(),
            input_key: Some(input_key.into()),
            memory_key: memory_key.into(),
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl PipelineConfig {
    /// The three-step celebrity search chain: who they are, when they were
    /// born, and what happened in the world around that time.
    pub fn celebrity_search() -> Self {
        Self {
            name: default_pipeline_name(),
            inputs: vec!["name".into()],
            outputs: vec!["person".into(), "dob".into(), "description".into()],
            return_all: false,
            stages: vec![
                StageConfig::new(
                    "person",
                    "Tell me about celebrity {name}",
                    "person",
                    "name",
                    "chat_history",
                ),
                StageConfig::new(
                    "dob",
                    "When was {person} born?",
                    "dob",
                    "person",
                    "chat_history",
                ),
                StageConfig::new(
                    "description",
                    "Mention 5 major events that happened around {dob} in the world.",
                    "description",
                    "dob",
                    "description_history",
                ),
            ],
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError("pipeline.name must not be empty".into()));
        }
        if self.stages.is_empty() {
            return Err(ConfigError::ValidationError(
                "pipeline.stages must contain at least one stage".into(),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.name.trim().is_empty() || stage.output_key.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "stage name and output_key must not be empty".into(),
                ));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            if let Some(t) = stage.temperature {
                check_temperature(t, &format!("stage '{}' temperature", stage.name))?;
            }
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::celebrity_search()
    }
}

fn check_temperature(value: f32, what: &str) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "{what} must be between 0.0 and 2.0"
        )));
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from the default path (~/.promptchain/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `PROMPTCHAIN_API_KEY` (highest priority)
    /// - `GROQ_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load from `path`, then apply the same environment overrides as
    /// [`AppConfig::load`].
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("PROMPTCHAIN_API_KEY")
                .or_else(|| lookup("GROQ_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("PROMPTCHAIN_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("PROMPTCHAIN_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".promptchain")
    }

    /// Get the configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_temperature(self.default_temperature, "default_temperature")?;

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_secs must be > 0".into(),
            ));
        }

        self.pipeline.validate()
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
            memory: MemoryConfig::default(),
            providers: HashMap::new(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "groq");
        assert_eq!(config.default_model, "llama3-70b-8192");
        assert!((config.default_temperature - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.memory.mode, MemoryModeConfig::Scoped);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_pipeline_is_celebrity_search() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.inputs, vec!["name"]);
        assert_eq!(pipeline.outputs, vec!["person", "dob", "description"]);
        let keys: Vec<&str> = pipeline.stages.iter().map(|s| s.output_key.as_str()).collect();
        assert_eq!(keys, vec!["person", "dob", "description"]);
        assert_eq!(pipeline.stages[2].memory_key, "description_history");
        assert_eq!(pipeline.stages[1].input_key.as_deref(), Some("person"));
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.pipeline.stages.len(), 3);
        assert_eq!(parsed.pipeline.stages[0].template, "Tell me about celebrity {name}");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_stage_temperature_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.stages[1].temperature = Some(-0.1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dob"));
    }

    #[test]
    fn empty_pipeline_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.stages.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_stage_names_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.stages[1].name = "person".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate stage name"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_provider, "groq");
    }

    #[test]
    fn config_file_is_parsed_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_provider = "openai"
default_model = "gpt-4o-mini"

[memory]
mode = "persistent"

[pipeline]
name = "two_step"
inputs = ["topic"]
outputs = ["summary", "title"]

[[pipeline.stages]]
name = "summarize"
template = "Summarize {topic}"
output_key = "summary"

[[pipeline.stages]]
name = "title"
template = "Give a title for: {summary}"
output_key = "title"
temperature = 0.2
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.memory.mode, MemoryModeConfig::Persistent);
        assert_eq!(config.pipeline.name, "two_step");
        assert_eq!(config.pipeline.stages.len(), 2);
        assert_eq!(config.pipeline.stages[0].memory_key, "history");
        assert!(config.pipeline.stages[0].input_key.is_none());
        assert_eq!(config.pipeline.stages[1].temperature, Some(0.2));
    }

    #[test]
    fn malformed_config_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_temperature = \"hot\"").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn env_overrides_fill_missing_key() {
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| match key {
            "GROQ_API_KEY" => Some("gsk-test".into()),
            "PROMPTCHAIN_MODEL" => Some("llama-3.1-8b-instant".into()),
            _ => None,
        });
        assert_eq!(config.api_key.as_deref(), Some("gsk-test"));
        assert_eq!(config.default_model, "llama-3.1-8b-instant");
        assert_eq!(config.default_provider, "groq");
    }

    #[test]
    fn env_does_not_replace_configured_key() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env_overrides(|_| Some("from-env".into()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("gsk-very-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("gsk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("groq"));
        assert!(toml_str.contains("description_history"));
    }
}
