//! `promptchain providers` — List supported LLM providers.

use promptchain_providers::router::{KNOWN_PROVIDERS, default_base_url};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🤖 Supported LLM Providers");
    println!("==========================");
    println!();
    print!("{}", provider_table());
    println!();
    println!("  Custom endpoints:");
    println!("    Any OpenAI-compatible API works out of the box:");
    println!("    default_provider = \"openai\"");
    println!("    [providers.openai]");
    println!("    api_url = \"https://your-custom-endpoint.com/v1\"");
    println!("    api_key = \"your-key\"");
    println!();
    println!("  Environment variables:");
    println!("    PROMPTCHAIN_API_KEY, GROQ_API_KEY, OPENAI_API_KEY");
    println!("    PROMPTCHAIN_PROVIDER, PROMPTCHAIN_MODEL");

    Ok(())
}

fn provider_table() -> String {
    let mut table = format!("  {:<12} {:<40} {}\n", "Provider", "Base URL", "Auth");
    for name in KNOWN_PROVIDERS {
        let auth = if super::is_local_provider(name) {
            "None (local)"
        } else {
            "API key"
        };
        table.push_str(&format!("  {:<12} {:<40} {}\n", name, default_base_url(name), auth));
    }
    table
}
