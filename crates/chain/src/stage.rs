//! A single pipeline stage: prompt template, provider, output key, memory.

use crate::Variables;
use crate::template::PromptTemplate;
use promptchain_core::error::{ChainError, ProviderError};
use promptchain_core::provider::{Provider, ProviderRequest, Usage};
use promptchain_memory::StageMemory;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default memory key used when none is given.
pub const DEFAULT_MEMORY_KEY: &str = "history";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Where a stage execution sits within a pipeline run, for log fields.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RunScope<'a> {
    pub run_id: &'a str,
    pub pipeline: &'a str,
    pub index: usize,
}

/// What one stage execution produced.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub key: String,
    pub value: String,
    pub usage: Option<Usage>,
}

/// One step of a sequential pipeline.
///
/// A stage owns its transcript. If the template references the stage's
/// memory key and the incoming variables do not supply it, the transcript
/// text is substituted.
pub struct Stage {
    name: String,
    prompt: PromptTemplate,
    provider: Arc<dyn Provider>,
    model: String,
    output_key: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
    memory: StageMemory,
    input_key_pinned: bool,
}

impl Stage {
    /// Create a stage.
    ///
    /// The memory key defaults to [`DEFAULT_MEMORY_KEY`] and the memory input
    /// key to the template's first variable other than the memory key.
    pub fn new(
        name: impl Into<String>,
        prompt: PromptTemplate,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        output_key: impl Into<String>,
    ) -> Self {
        let input_key = default_input_key(&prompt, DEFAULT_MEMORY_KEY);
        Self {
            name: name.into(),
            prompt,
            provider,
            model: model.into(),
            output_key: output_key.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            timeout: None,
            memory: StageMemory::new(input_key, DEFAULT_MEMORY_KEY),
            input_key_pinned: false,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Bound each provider call. Expiry fails the stage with a timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Choose which variable is recorded as the "Human" side of each exchange.
    pub fn with_memory_input_key(mut self, input_key: impl Into<String>) -> Self {
        self.memory = StageMemory::new(input_key, self.memory.memory_key().to_string());
        self.input_key_pinned = true;
        self
    }

    /// Rename the transcript. An input key that was never set explicitly is
    /// re-derived so it never points at the transcript itself.
    pub fn with_memory_key(mut self, memory_key: impl Into<String>) -> Self {
        let memory_key = memory_key.into();
        let input_key = if self.input_key_pinned {
            self.memory.input_key().to_string()
        } else {
            default_input_key(&self.prompt, &memory_key)
        };
        self.memory = StageMemory::new(input_key, memory_key);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn memory(&self) -> &StageMemory {
        &self.memory
    }

    pub(crate) fn memory_mut(&mut self) -> &mut StageMemory {
        &mut self.memory
    }

    /// Variables this stage needs from inputs or earlier stages.
    ///
    /// The stage's own memory key is excluded since the transcript can
    /// always fill it.
    pub fn required_variables(&self) -> Vec<&str> {
        let memory_key = self.memory.memory_key();
        let mut required: Vec<&str> = Vec::new();
        let input_key = Some(self.memory.input_key()).filter(|k| !k.is_empty());
        for var in self
            .prompt
            .input_variables()
            .iter()
            .map(String::as_str)
            .chain(input_key)
        {
            if var != memory_key && !required.contains(&var) {
                required.push(var);
            }
        }
        required
    }

    /// Render the prompt, call the provider once, and record the exchange.
    ///
    /// Nothing is recorded if rendering or the provider call fails.
    pub async fn execute(&mut self, vars: &Variables) -> Result<StageOutput, ChainError> {
        self.execute_in(vars, RunScope::default()).await
    }

    pub(crate) async fn execute_in(
        &mut self,
        vars: &Variables,
        scope: RunScope<'_>,
    ) -> Result<StageOutput, ChainError> {
        let buffer = self.memory.buffer();
        let memory_key = self.memory.memory_key();
        let rendered = self.prompt.render_with(|k| {
            vars.get(k)
                .map(String::as_str)
                .or_else(|| (k == memory_key).then_some(buffer.as_str()))
        })?;

        let input_key = self.memory.input_key();
        let input = if input_key.is_empty() {
            rendered.clone()
        } else {
            vars.get(input_key)
                .cloned()
                .ok_or_else(|| ChainError::MissingVariable {
                    template: self.prompt.name().to_string(),
                    name: input_key.to_string(),
                })?
        };

        debug!(
            run_id = scope.run_id,
            pipeline = scope.pipeline,
            index = scope.index,
            stage = %self.name,
            model = %self.model,
            prompt_len = rendered.len(),
            "Calling provider"
        );

        let mut request = ProviderRequest::prompt(&self.model, rendered, self.temperature);
        request.max_tokens = self.max_tokens;

        let call = self.provider.complete(request);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                ProviderError::Timeout(format!(
                    "stage '{}' got no completion within {}ms",
                    self.name,
                    limit.as_millis()
                ))
            })??,
            None => call.await?,
        };

        let value = response.text().to_string();
        self.memory.record(input, value.clone());

        Ok(StageOutput {
            key: self.output_key.clone(),
            value,
            usage: response.usage,
        })
    }
}

fn default_input_key(prompt: &PromptTemplate, memory_key: &str) -> String {
    prompt
        .input_variables()
        .iter()
        .find(|v| v.as_str() != memory_key)
        .cloned()
        .unwrap_or_default()
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("output_key", &self.output_key)
            .field("memory_entries", &self.memory.len())
            .finish()
    }
}
