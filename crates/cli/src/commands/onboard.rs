//! `promptchain onboard` — First-time setup.

use promptchain_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = super::resolve_config_path(config_path);

    println!("PromptChain — First-Time Setup");
    println!("==============================\n");

    if let Some(config_dir) = config_path.parent() {
        if !config_dir.exists() {
            std::fs::create_dir_all(config_dir)?;
            println!("✅ Created config directory: {}", config_dir.display());
        } else {
            println!("  Config directory exists: {}", config_dir.display());
        }
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Export GROQ_API_KEY or add api_key to {}", config_path.display());
    println!("   2. Run: promptchain search \"Isaac Newton\"");
    println!("   3. Edit [[pipeline.stages]] to build your own chain\n");

    Ok(())
}
