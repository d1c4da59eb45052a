//! Stage memory — the append-only transcript of one stage's exchanges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One (input, output) exchange recorded by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// The value of the stage's input key when it ran
    pub input: String,

    /// The completion the stage produced
    pub output: String,

    /// When the exchange was recorded
    pub recorded_at: DateTime<Utc>,
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Human: {}", self.input)?;
        writeln!(f, "AI: {}", self.output)
    }
}

/// The transcript of one stage.
///
/// `input_key` names the variable treated as the "question" of each
/// exchange; `memory_key` is the name the transcript is exposed under.
/// Entries only ever get appended; [`StageMemory::clear`] exists for the
/// pipeline to reset scoped memories between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMemory {
    input_key: String,
    memory_key: String,
    entries: Vec<TranscriptEntry>,
}

impl StageMemory {
    pub fn new(input_key: impl Into<String>, memory_key: impl Into<String>) -> Self {
        Self {
            input_key: input_key.into(),
            memory_key: memory_key.into(),
            entries: Vec::new(),
        }
    }

    pub fn input_key(&self) -> &str {
        &self.input_key
    }

    pub fn memory_key(&self) -> &str {
        &self.memory_key
    }

    /// Append one exchange.
    pub fn record(&mut self, input: impl Into<String>, output: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            input: input.into(),
            output: output.into(),
            recorded_at: Utc::now(),
        });
    }

    /// Iterate the transcript in insertion order. Call again to restart.
    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> + '_ {
        self.entries.iter()
    }

    /// The transcript as text: `Human: ...` / `AI: ...` lines per entry.
    pub fn buffer(&self) -> String {
        self.to_string()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl fmt::Display for StageMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_memory_has_empty_buffer() {
        let mem = StageMemory::new("name", "chat_history");
        assert!(mem.is_empty());
        assert_eq!(mem.buffer(), "");
    }

    #[test]
    fn buffer_formats_each_exchange() {
        let mut mem = StageMemory::new("name", "chat_history");
        mem.record("Isaac Newton", "Isaac Newton is a physicist.");
        assert_eq!(
            mem.buffer(),
            "Human: Isaac Newton\nAI: Isaac Newton is a physicist.\n"
        );
    }

    #[test]
    fn entries_keep_insertion_order() {
        let mut mem = StageMemory::new("dob", "description_history");
        for i in 0..5 {
            mem.record(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(mem.len(), 5);
        let inputs: Vec<&str> = mem.entries().map(|e| e.input.as_str()).collect();
        assert_eq!(inputs, vec!["q0", "q1", "q2", "q3", "q4"]);
        assert_eq!(mem.buffer().matches("Human: ").count(), 5);
        assert!(mem.buffer().find("q1").unwrap() < mem.buffer().find("q3").unwrap());
    }

    #[test]
    fn entries_view_is_restartable() {
        let mut mem = StageMemory::new("person", "chat_history");
        mem.record("a", "b");
        mem.record("c", "d");
        assert_eq!(mem.entries().count(), 2);
        assert_eq!(mem.entries().count(), 2);
        assert_eq!(mem.buffer(), mem.buffer());
    }

    #[test]
    fn clear_resets_transcript_but_keeps_keys() {
        let mut mem = StageMemory::new("person", "chat_history");
        mem.record("a", "b");
        mem.clear();
        assert!(mem.is_empty());
        assert_eq!(mem.input_key(), "person");
        assert_eq!(mem.memory_key(), "chat_history");
    }

    #[test]
    fn multiline_values_are_kept_verbatim() {
        let mut mem = StageMemory::new("dob", "description_history");
        mem.record("1642", "1. Event A\n2. Event B");
        assert_eq!(mem.buffer(), "Human: 1642\nAI: 1. Event A\n2. Event B\n");
    }

    #[test]
    fn memory_serializes_entries() {
        let mut mem = StageMemory::new("name", "chat_history");
        mem.record("Ada", "A mathematician.");
        let json = serde_json::to_value(&mem).unwrap();
        assert_eq!(json["memory_key"], "chat_history");
        assert_eq!(json["entries"][0]["output"], "A mathematician.");
    }
}
