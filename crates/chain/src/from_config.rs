//! Build a [`SequentialPipeline`] from `[pipeline]` configuration.

use crate::pipeline::{PipelineBuilder, SequentialPipeline};
use crate::stage::Stage;
use crate::template::PromptTemplate;
use promptchain_config::{AppConfig, MemoryModeConfig, StageConfig};
use promptchain_core::error::ChainError;
use promptchain_core::provider::Provider;
use promptchain_memory::MemoryMode;
use std::sync::Arc;
use std::time::Duration;

fn memory_mode(mode: MemoryModeConfig) -> MemoryMode {
    match mode {
        MemoryModeConfig::Scoped => MemoryMode::Scoped,
        MemoryModeConfig::Persistent => MemoryMode::Persistent,
    }
}

/// Build the configured pipeline with every stage sharing `provider`.
pub fn build_pipeline(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
) -> Result<SequentialPipeline, ChainError> {
    pipeline_builder(config, provider)?.build()
}

/// A builder preloaded with the configured stages, for callers that want
/// to attach an event bus or adjust settings before building.
///
/// A stage's model is its own override, else the provider's configured
/// default model, else the global default. Temperature and max tokens fall
/// back to the global defaults.
pub fn pipeline_builder(
    config: &AppConfig,
    provider: Arc<dyn Provider>,
) -> Result<PipelineBuilder, ChainError> {
    let pipeline = &config.pipeline;
    let provider_model = config
        .providers
        .get(&config.default_provider)
        .and_then(|p| p.default_model.clone());
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let mut builder = SequentialPipeline::builder(&pipeline.name)
        .inputs(pipeline.inputs.iter().cloned())
        .outputs(pipeline.outputs.iter().cloned())
        .return_all(pipeline.return_all)
        .memory_mode(memory_mode(config.memory.mode));

    for stage_config in &pipeline.stages {
        let model = stage_config
            .model
            .clone()
            .or_else(|| provider_model.clone())
            .unwrap_or_else(|| config.default_model.clone());
        builder = builder.stage(build_stage(
            stage_config,
            provider.clone(),
            model,
            config,
            timeout,
        )?);
    }

    Ok(builder)
}

fn build_stage(
    stage_config: &StageConfig,
    provider: Arc<dyn Provider>,
    model: String,
    config: &AppConfig,
    timeout: Duration,
) -> Result<Stage, ChainError> {
    let prompt = PromptTemplate::from_template(&stage_config.name, &stage_config.template)?;
    let mut stage = Stage::new(
        &stage_config.name,
        prompt,
        provider,
        model,
        &stage_config.output_key,
    )
    .with_temperature(stage_config.temperature.unwrap_or(config.default_temperature))
    .with_memory_key(&stage_config.memory_key)
    .with_timeout(timeout);

    if let Some(input_key) = &stage_config.input_key {
        stage = stage.with_memory_input_key(input_key);
    }
    if let Some(max_tokens) = stage_config.max_tokens.or(config.default_max_tokens) {
        stage = stage.with_max_tokens(max_tokens);
    }
    Ok(stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Variables;
    use crate::test_helpers::ScriptedProvider;
    use promptchain_config::{PipelineConfig, ProviderConfig};

    #[tokio::test]
    async fn default_config_builds_celebrity_search() {
        let provider = Arc::new(ScriptedProvider::texts(&["p", "d", "e"]));
        let mut pipeline = build_pipeline(&AppConfig::default(), provider.clone()).unwrap();

        assert_eq!(pipeline.name(), "celebrity_search");
        assert_eq!(pipeline.stages().len(), 3);
        assert_eq!(pipeline.memory_mode(), MemoryMode::Scoped);
        let memory_keys: Vec<&str> = pipeline
            .stages()
            .iter()
            .map(|s| s.memory().memory_key())
            .collect();
        assert_eq!(memory_keys, vec!["chat_history", "chat_history", "description_history"]);

        let seed = Variables::from([("name".to_string(), "Isaac Newton".to_string())]);
        let out = pipeline.run(seed).await.unwrap();
        assert_eq!(out.variables.len(), 4);
        assert!(provider.models().iter().all(|m| m == "llama3-70b-8192"));
    }

    #[test]
    fn model_resolution_cascade() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "groq".into(),
            ProviderConfig {
                api_key: None,
                api_url: None,
                default_model: Some("mixtral-8x7b-32768".into()),
            },
        );
        config.pipeline.stages[2].model = Some("llama3-8b-8192".into());
        config.pipeline.stages[2].temperature = Some(0.2);

        let provider = Arc::new(ScriptedProvider::texts(&[]));
        let pipeline = build_pipeline(&config, provider).unwrap();
        let models: Vec<&str> = pipeline.stages().iter().map(|s| s.model()).collect();
        assert_eq!(models, vec!["mixtral-8x7b-32768", "mixtral-8x7b-32768", "llama3-8b-8192"]);
        assert_eq!(pipeline.stages()[0].temperature(), 0.8);
        assert_eq!(pipeline.stages()[2].temperature(), 0.2);
    }

    #[test]
    fn persistent_mode_is_carried_over() {
        let mut config = AppConfig::default();
        config.memory.mode = MemoryModeConfig::Persistent;
        let pipeline = build_pipeline(&config, Arc::new(ScriptedProvider::texts(&[]))).unwrap();
        assert_eq!(pipeline.memory_mode(), MemoryMode::Persistent);
    }

    #[test]
    fn invalid_template_in_config_is_reported() {
        let mut config = AppConfig::default();
        config.pipeline = PipelineConfig {
            stages: vec![StageConfig {
                template: "Tell me about {name".into(),
                ..PipelineConfig::celebrity_search().stages[0].clone()
            }],
            outputs: vec!["person".into()],
            ..PipelineConfig::celebrity_search()
        };
        let err = build_pipeline(&config, Arc::new(ScriptedProvider::texts(&[]))).unwrap_err();
        assert!(matches!(err, ChainError::InvalidTemplate { .. }));
    }

    #[test]
    fn miswired_config_is_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.stages.swap(0, 1);
        let err = build_pipeline(&config, Arc::new(ScriptedProvider::texts(&[]))).unwrap_err();
        assert!(matches!(err, ChainError::UnresolvedVariable { ref name, .. } if name == "person"));
    }
}
