//! The sequential pipeline runner.
//!
//! Stages run strictly in order. Each stage's output joins the variable
//! mapping under its output key, where later stages can pick it up. Any
//! failure aborts the run and discards the partial mapping.

use crate::Variables;
use crate::stage::{RunScope, Stage};
use chrono::Utc;
use promptchain_core::error::ChainError;
use promptchain_core::event::{DomainEvent, EventBus};
use promptchain_memory::{MemoryMode, StageMemory};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Characters of each stage output carried in `StageCompleted` events.
const PREVIEW_CHARS: usize = 80;

/// Snapshot of one stage's transcript after a run.
#[derive(Debug, Clone, Serialize)]
pub struct StageTranscript {
    pub stage: String,
    pub memory: StageMemory,
    /// The transcript rendered as `Human:` / `AI:` lines
    pub buffer: String,
}

impl StageTranscript {
    pub fn new(stage: impl Into<String>, memory: StageMemory) -> Self {
        Self {
            stage: stage.into(),
            buffer: memory.buffer(),
            memory,
        }
    }
}

/// The result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub run_id: String,
    /// Inputs and declared outputs, or every variable when `return_all`
    pub variables: Variables,
    /// One transcript per stage, in stage order
    pub memories: Vec<StageTranscript>,
}

impl PipelineOutput {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Transcript of the named stage.
    pub fn memory(&self, stage: &str) -> Option<&StageMemory> {
        self.memories
            .iter()
            .find(|t| t.stage == stage)
            .map(|t| &t.memory)
    }
}

/// Builds a [`SequentialPipeline`], checking its wiring up front.
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Stage>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    memory_mode: MemoryMode,
    return_all: bool,
    events: Option<Arc<EventBus>>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            memory_mode: MemoryMode::default(),
            return_all: false,
            events: None,
        }
    }

    pub fn input(mut self, name: impl Into<String>) -> Self {
        push_unique(&mut self.inputs, name.into());
        self
    }

    pub fn inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            push_unique(&mut self.inputs, name.into());
        }
        self
    }

    pub fn output(mut self, name: impl Into<String>) -> Self {
        push_unique(&mut self.outputs, name.into());
        self
    }

    pub fn outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            push_unique(&mut self.outputs, name.into());
        }
        self
    }

    /// Append a stage. Stages run in the order they are added.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn memory_mode(mut self, mode: MemoryMode) -> Self {
        self.memory_mode = mode;
        self
    }

    /// Return every variable instead of just inputs and declared outputs.
    pub fn return_all(mut self, return_all: bool) -> Self {
        self.return_all = return_all;
        self
    }

    /// Publish run and stage events to this bus.
    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the wiring and build the pipeline.
    pub fn build(self) -> Result<SequentialPipeline, ChainError> {
        if self.stages.is_empty() {
            return Err(ChainError::EmptyPipeline(self.name));
        }

        let mut available: HashSet<&str> = self.inputs.iter().map(String::as_str).collect();
        let mut produced: HashSet<&str> = HashSet::new();

        for stage in &self.stages {
            let key = stage.output_key();
            if available.contains(key) {
                return Err(ChainError::DuplicateOutput {
                    key: key.to_string(),
                    stage: stage.name().to_string(),
                });
            }
            let memory = stage.memory();
            if memory.input_key() == memory.memory_key() {
                return Err(ChainError::UnresolvedVariable {
                    stage: stage.name().to_string(),
                    name: memory.input_key().to_string(),
                });
            }
            if let Some(missing) = stage
                .required_variables()
                .into_iter()
                .find(|v| !available.contains(v))
            {
                return Err(ChainError::UnresolvedVariable {
                    stage: stage.name().to_string(),
                    name: missing.to_string(),
                });
            }
            available.insert(key);
            produced.insert(key);
        }

        if let Some(missing) = self.outputs.iter().find(|o| !produced.contains(o.as_str())) {
            return Err(ChainError::UndeclaredOutput(missing.clone()));
        }

        debug!(
            pipeline = %self.name,
            stages = self.stages.len(),
            inputs = ?self.inputs,
            outputs = ?self.outputs,
            "Pipeline built"
        );

        Ok(SequentialPipeline {
            name: self.name,
            stages: self.stages,
            inputs: self.inputs,
            outputs: self.outputs,
            memory_mode: self.memory_mode,
            return_all: self.return_all,
            events: self.events,
        })
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// An ordered chain of stages with declared inputs and outputs.
pub struct SequentialPipeline {
    name: String,
    stages: Vec<Stage>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    memory_mode: MemoryMode,
    return_all: bool,
    events: Option<Arc<EventBus>>,
}

impl SequentialPipeline {
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn memory_mode(&self) -> MemoryMode {
        self.memory_mode
    }

    /// Clear every stage transcript.
    pub fn reset_memories(&mut self) {
        for stage in &mut self.stages {
            stage.memory_mut().clear();
        }
    }

    /// Run every stage once against `seed`.
    ///
    /// The seed must contain every declared input and must not contain any
    /// stage output key. In scoped memory mode transcripts are cleared first.
    pub async fn run(&mut self, seed: Variables) -> Result<PipelineOutput, ChainError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let events = self.events.clone();
        let started = Instant::now();

        info!(
            run_id = %run_id,
            pipeline = %self.name,
            stages = self.stages.len(),
            "Pipeline run started"
        );
        emit(
            events.as_deref(),
            DomainEvent::PipelineStarted {
                run_id: run_id.clone(),
                pipeline: self.name.clone(),
                stages: self.stages.len(),
                timestamp: Utc::now(),
            },
        );

        match self.run_stages(&run_id, seed, events.as_deref()).await {
            Ok(mut variables) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                if !self.return_all {
                    variables.retain(|k, _| self.inputs.contains(k) || self.outputs.contains(k));
                }
                let memories = self
                    .stages
                    .iter()
                    .map(|s| StageTranscript::new(s.name(), s.memory().clone()))
                    .collect();

                info!(run_id = %run_id, pipeline = %self.name, duration_ms, "Pipeline run completed");
                emit(
                    events.as_deref(),
                    DomainEvent::PipelineCompleted {
                        run_id: run_id.clone(),
                        pipeline: self.name.clone(),
                        duration_ms,
                        timestamp: Utc::now(),
                    },
                );

                Ok(PipelineOutput {
                    run_id,
                    variables,
                    memories,
                })
            }
            Err(e) => {
                warn!(run_id = %run_id, pipeline = %self.name, error = %e, "Pipeline run failed");
                emit(
                    events.as_deref(),
                    DomainEvent::PipelineFailed {
                        run_id,
                        pipeline: self.name.clone(),
                        error_message: e.to_string(),
                        timestamp: Utc::now(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn run_stages(
        &mut self,
        run_id: &str,
        seed: Variables,
        events: Option<&EventBus>,
    ) -> Result<Variables, ChainError> {
        if let Some(missing) = self.inputs.iter().find(|i| !seed.contains_key(*i)) {
            return Err(ChainError::MissingInput {
                pipeline: self.name.clone(),
                name: missing.clone(),
            });
        }
        if let Some(stage) = self.stages.iter().find(|s| seed.contains_key(s.output_key())) {
            return Err(ChainError::DuplicateOutput {
                key: stage.output_key().to_string(),
                stage: stage.name().to_string(),
            });
        }

        if self.memory_mode.resets_each_run() {
            self.reset_memories();
        }

        let pipeline = self.name.as_str();
        let mut vars = seed;
        for (index, stage) in self.stages.iter_mut().enumerate() {
            let stage_name = stage.name().to_string();
            debug!(run_id, pipeline, index, stage = %stage_name, "Stage started");
            emit(
                events,
                DomainEvent::StageStarted {
                    run_id: run_id.to_string(),
                    index,
                    stage: stage_name.clone(),
                    timestamp: Utc::now(),
                },
            );

            let started = Instant::now();
            let scope = RunScope {
                run_id,
                pipeline,
                index,
            };
            let result = stage.execute_in(&vars, scope).await.and_then(|out| {
                if vars.contains_key(&out.key) {
                    Err(ChainError::DuplicateOutput {
                        key: out.key,
                        stage: stage_name.clone(),
                    })
                } else {
                    Ok(out)
                }
            });

            match result {
                Ok(out) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let tokens_used = out.usage.as_ref().map_or(0, |u| u.total_tokens);
                    debug!(
                        run_id,
                        pipeline,
                        index,
                        stage = %stage_name,
                        output_key = %out.key,
                        duration_ms,
                        tokens_used,
                        "Stage completed"
                    );
                    emit(
                        events,
                        DomainEvent::StageCompleted {
                            run_id: run_id.to_string(),
                            index,
                            stage: stage_name,
                            output_key: out.key.clone(),
                            output_preview: preview(&out.value),
                            tokens_used,
                            duration_ms,
                            timestamp: Utc::now(),
                        },
                    );
                    vars.insert(out.key, out.value);
                }
                Err(e) => {
                    warn!(run_id, pipeline, index, stage = %stage_name, error = %e, "Stage failed");
                    emit(
                        events,
                        DomainEvent::StageFailed {
                            run_id: run_id.to_string(),
                            index,
                            stage: stage_name.clone(),
                            error_message: e.to_string(),
                            timestamp: Utc::now(),
                        },
                    );
                    return Err(ChainError::StageFailed {
                        index,
                        stage: stage_name,
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(vars)
    }
}

impl std::fmt::Debug for SequentialPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialPipeline")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("memory_mode", &self.memory_mode)
            .field("return_all", &self.return_all)
            .finish()
    }
}

fn emit(events: Option<&EventBus>, event: DomainEvent) {
    if let Some(bus) = events {
        bus.publish(event);
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
