//! Domain event system — the observability hook for pipeline runs.
//!
//! Pipelines and stages publish events on entry and exit. Subscribers
//! (a CLI trace printer, a test, a UI) decide what to do with them; the
//! publisher never knows about the sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A pipeline run began
    PipelineStarted {
        run_id: String,
        pipeline: String,
        stages: usize,
        timestamp: DateTime<Utc>,
    },

    /// A stage is about to render its prompt and call the provider
    StageStarted {
        run_id: String,
        index: usize,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage produced its output
    StageCompleted {
        run_id: String,
        index: usize,
        stage: String,
        output_key: String,
        output_preview: String,
        tokens_used: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A stage failed; the run is aborted
    StageFailed {
        run_id: String,
        index: usize,
        stage: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// Every stage succeeded
    PipelineCompleted {
        run_id: String,
        pipeline: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The run aborted (validation or stage failure)
    PipelineFailed {
        run_id: String,
        pipeline: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short event name, handy for log lines.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PipelineStarted { .. } => "pipeline_started",
            Self::StageStarted { .. } => "stage_started",
            Self::StageCompleted { .. } => "stage_completed",
            Self::StageFailed { .. } => "stage_failed",
            Self::PipelineCompleted { .. } => "pipeline_completed",
            Self::PipelineFailed { .. } => "pipeline_failed",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::StageStarted {
            run_id: "run-1".into(),
            index: 0,
            stage: "person".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::StageStarted { stage, index, .. } => {
                assert_eq!(stage, "person");
                assert_eq!(*index, 0);
            }
            _ => panic!("Expected StageStarted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::PipelineFailed {
            run_id: "run-1".into(),
            pipeline: "celebrity_search".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = DomainEvent::PipelineCompleted {
            run_id: "r".into(),
            pipeline: "p".into(),
            duration_ms: 12,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"pipeline_completed""#));
        assert_eq!(event.event_type(), "pipeline_completed");
    }
}
