//! Stage memory for PromptChain.
//!
//! Each stage keeps its own transcript of (input, output) exchanges.
//! [`MemoryMode`] decides whether those transcripts survive between runs.

pub mod transcript;

pub use transcript::{StageMemory, TranscriptEntry};

use serde::{Deserialize, Serialize};

/// Lifetime of stage transcripts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    /// Every run starts with empty transcripts
    #[default]
    Scoped,
    /// Transcripts accumulate across runs for the life of the pipeline
    Persistent,
}

impl MemoryMode {
    /// Whether transcripts are cleared at the start of a run.
    pub fn resets_each_run(self) -> bool {
        matches!(self, MemoryMode::Scoped)
    }
}
