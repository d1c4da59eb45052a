//! `promptchain doctor` — Diagnose configuration and provider health.

use promptchain_core::Provider;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 PromptChain Doctor — System Diagnostics");
    println!("==========================================\n");

    let mut issues = 0;

    let path = super::resolve_config_path(config_path);
    if path.exists() {
        println!("  ✅ Config file found: {}", path.display());
    } else {
        println!("  ⚠️  No config file, using defaults. Run `promptchain onboard`");
    }

    let config = match super::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. See above for details.");
            return Ok(());
        }
    };

    if config.has_api_key() || super::is_local_provider(&config.default_provider) {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured (export GROQ_API_KEY or add api_key to config.toml)");
        issues += 1;
    }

    let router = promptchain_providers::build_from_config(&config);
    match router.default() {
        Ok(provider) => match promptchain_chain::build_pipeline(&config, provider) {
            Ok(pipeline) => println!(
                "  ✅ Pipeline '{}' wired correctly ({} stages)",
                pipeline.name(),
                pipeline.stages().len()
            ),
            Err(e) => {
                println!("  ❌ Pipeline invalid: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    for name in router.list() {
        let Some(provider) = router.get(name) else {
            continue;
        };
        match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider '{name}' reachable"),
            Ok(false) => {
                println!("  ⚠️  Provider '{name}' responded but reported unhealthy");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider '{name}' unreachable: {e}");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
