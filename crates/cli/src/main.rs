//! PromptChain CLI — the main entry point.
//!
//! Commands:
//! - `search`    — Run the prompt chain for a name (or names from stdin)
//! - `onboard`   — Initialize the config directory and file
//! - `config`    — Show, locate, or validate configuration
//! - `doctor`    — Diagnose configuration and provider health
//! - `providers` — List supported LLM providers

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "promptchain",
    about = "PromptChain — sequential prompt chains against hosted LLMs",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Use this config file instead of ~/.promptchain/config.toml
    #[arg(short, long, global = true, env = "PROMPTCHAIN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the prompt chain
    Search {
        /// Value for the pipeline's first input; reads lines from stdin if omitted
        name: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Extra seed variables as key=value
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Keep stage memory across runs in interactive mode
        #[arg(long)]
        persistent: bool,

        /// Print pipeline events as JSON lines on stderr
        #[arg(long)]
        trace_events: bool,
    },

    /// Initialize configuration
    Onboard,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose configuration and provider health
    Doctor,

    /// List supported LLM providers
    Providers,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file path
    Path,
    /// Validate the config file
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Search {
            name,
            json,
            vars,
            persistent,
            trace_events,
        } => {
            let options = commands::search::SearchOptions {
                name,
                json,
                vars,
                persistent,
                trace_events,
            };
            commands::search::run(config_path, options).await?
        }
        Commands::Onboard => commands::onboard::run(config_path).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
        },
        Commands::Doctor => commands::doctor::run(config_path).await?,
        Commands::Providers => commands::providers::run().await?,
    }

    Ok(())
}
