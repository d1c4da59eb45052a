//! `promptchain config` — Configuration management commands.

use promptchain_config::AppConfig;
use std::path::Path;

const REDACTED: &str = "[REDACTED]";

pub async fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Provider:  {}", config.default_provider);
    println!("   Model:     {}", config.default_model);
    println!("   Memory:    {:?}", config.memory.mode);
    println!("   Pipeline:  {}", config.pipeline.name);
    for (i, stage) in config.pipeline.stages.iter().enumerate() {
        println!("     {i}. {} -> {}", stage.name, stage.output_key);
    }

    Ok(())
}

/// Problems that do not stop the config from loading.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.has_api_key() && !super::is_local_provider(&config.default_provider) {
        warnings.push("No API key set (set GROQ_API_KEY or PROMPTCHAIN_API_KEY)".to_string());
    }

    let stage_outputs: Vec<&str> = config
        .pipeline
        .stages
        .iter()
        .map(|s| s.output_key.as_str())
        .collect();
    for output in &config.pipeline.outputs {
        if !stage_outputs.contains(&output.as_str()) {
            warnings.push(format!("Declared output '{output}' is not produced by any stage"));
        }
    }

    if config.pipeline.inputs.is_empty() {
        warnings.push("Pipeline declares no inputs; `search NAME` will ignore NAME".to_string());
    }

    warnings
}

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", super::resolve_config_path(config_path).display());
    Ok(())
}

fn redacted(mut config: AppConfig) -> AppConfig {
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some(REDACTED.into());
        }
    }
    config
}
