//! Sequential prompt pipelines.
//!
//! A [`SequentialPipeline`] runs a fixed list of [`Stage`]s in order. Each
//! stage renders a [`PromptTemplate`] against the variables accumulated so
//! far, asks a provider for a completion, records the exchange in its own
//! transcript, and publishes the completion under its output key for the
//! stages after it.

pub mod from_config;
pub mod pipeline;
pub mod stage;
pub mod template;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use from_config::{build_pipeline, pipeline_builder};
pub use pipeline::{PipelineBuilder, PipelineOutput, SequentialPipeline, StageTranscript};
pub use stage::{Stage, StageOutput};
pub use template::PromptTemplate;

use std::collections::BTreeMap;

/// Named string values flowing through a pipeline.
pub type Variables = BTreeMap<String, String>;
