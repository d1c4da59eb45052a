//! CLI subcommands.

pub mod config_cmd;
pub mod doctor;
pub mod onboard;
pub mod providers;
pub mod search;

use promptchain_config::{AppConfig, ConfigError};
use std::path::{Path, PathBuf};

/// The config file in use: the `--config` override or the default path.
pub fn resolve_config_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_path)
}

/// Load configuration with environment overrides applied.
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    AppConfig::load_with_env(&resolve_config_path(config_path))
}

/// Providers that run locally and need no API key.
pub fn is_local_provider(name: &str) -> bool {
    matches!(name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}
