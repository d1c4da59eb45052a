//! `promptchain search` — Run the prompt chain once, or once per stdin line.

use promptchain_chain::{PipelineOutput, SequentialPipeline, Variables, pipeline_builder};
use promptchain_config::{AppConfig, MemoryModeConfig};
use promptchain_core::event::EventBus;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

pub struct SearchOptions {
    pub name: Option<String>,
    pub json: bool,
    pub vars: Vec<String>,
    pub persistent: bool,
    pub trace_events: bool,
}

pub async fn run(
    config_path: Option<&Path>,
    options: SearchOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() && !super::is_local_provider(&config.default_provider) {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export GROQ_API_KEY='gsk_...'          (default provider)");
        eprintln!("    export OPENAI_API_KEY='sk-...'         (for OpenAI)");
        eprintln!("    export PROMPTCHAIN_API_KEY='...'       (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", super::resolve_config_path(config_path).display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    if options.persistent {
        config.memory.mode = MemoryModeConfig::Persistent;
    }

    let router = promptchain_providers::build_from_config(&config);
    let provider = router.default()?;

    let event_bus = Arc::new(EventBus::default());
    let mut events = options.trace_events.then(|| event_bus.subscribe());

    let mut pipeline = pipeline_builder(&config, provider)?
        .event_bus(event_bus)
        .build()?;

    let base = parse_vars(&options.vars)?;

    match options.name {
        Some(name) => {
            let seed = seed_for(&pipeline, &base, &name);
            let result = pipeline.run(seed).await;
            drain_events(events.as_mut());
            let output = result?;
            print_output(&pipeline, &output, options.json)?;
        }
        None => interactive(&mut pipeline, &config, &base, options.json, events.as_mut()).await?,
    }

    Ok(())
}

async fn interactive(
    pipeline: &mut SequentialPipeline,
    config: &AppConfig,
    base: &Variables,
    json: bool,
    mut events: Option<&mut broadcast::Receiver<Arc<promptchain_core::DomainEvent>>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let input_name = pipeline.inputs().first().cloned().unwrap_or_default();
    if !json {
        eprintln!();
        eprintln!("  PromptChain — {}", pipeline.name());
        eprintln!("  Provider:  {}", config.default_provider);
        eprintln!("  Model:     {}", config.default_model);
        eprintln!("  Memory:    {:?}", pipeline.memory_mode());
        eprintln!();
        eprintln!("  Enter a {input_name} per line. Type 'exit' or Ctrl+D to quit.");
        eprintln!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let seed = seed_for(pipeline, base, line);
        let result = pipeline.run(seed).await;
        drain_events(events.as_deref_mut());
        match result {
            Ok(output) => print_output(pipeline, &output, json)?,
            Err(e) => eprintln!("  [Error] {e}"),
        }
    }

    Ok(())
}

/// Parse `key=value` pairs.
fn parse_vars(pairs: &[String]) -> Result<Variables, String> {
    let mut vars = Variables::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid --var '{pair}', expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Invalid --var '{pair}', key is empty"));
        }
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

/// The positional value fills the pipeline's first declared input.
fn seed_for(pipeline: &SequentialPipeline, base: &Variables, value: &str) -> Variables {
    let mut seed = base.clone();
    if let Some(input) = pipeline.inputs().first() {
        seed.insert(input.clone(), value.to_string());
    }
    seed
}

fn drain_events(events: Option<&mut broadcast::Receiver<Arc<promptchain_core::DomainEvent>>>) {
    let Some(rx) = events else {
        return;
    };
    loop {
        match rx.try_recv() {
            Ok(event) => match serde_json::to_string(event.as_ref()) {
                Ok(line) => eprintln!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
            },
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event trace lagged");
            }
            Err(_) => break,
        }
    }
}

fn print_output(
    pipeline: &SequentialPipeline,
    output: &PipelineOutput,
    json: bool,
) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", render_json(output)?);
    } else {
        print!("{}", render_text(pipeline.outputs(), output));
    }
    Ok(())
}

/// Machine-readable rendering: variables plus each stage's transcript and buffer.
fn render_json(output: &PipelineOutput) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(output)
}

/// Human-readable rendering: each declared output, then each stage's transcript.
fn render_text(outputs: &[String], output: &PipelineOutput) -> String {
    let mut text = String::new();
    for key in outputs {
        if let Some(value) = output.get(key) {
            text.push_str(&format!("== {key} ==\n{value}\n\n"));
        }
    }
    for transcript in &output.memories {
        text.push_str(&format!(
            "== {} memory ({}) ==\n{}\n",
            transcript.stage,
            transcript.memory.memory_key(),
            transcript.buffer
        ));
    }
    text
}
