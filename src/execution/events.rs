//! # Pipeline Events
//!
//! The event trail a run emits. Engines record events through an [`EventSink`];
//! the run API persists each one to the instance's event log storage as it is
//! emitted, and reexecution planning reads the trail back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::storage::EventLogStorage;

/// Kind of object store operation recorded by a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectStoreOperationType {
    SetObject,
    GetObject,
    CpObject,
}

impl fmt::Display for ObjectStoreOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetObject => write!(f, "SET_OBJECT"),
            Self::GetObject => write!(f, "GET_OBJECT"),
            Self::CpObject => write!(f, "CP_OBJECT"),
        }
    }
}

/// Event-specific payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventSpecificData {
    PipelineStart,
    PipelineSuccess,
    PipelineFailure,
    StepStart,
    StepSuccess,
    StepFailure {
        error: String,
    },
    StepSkipped,
    ObjectStoreOperation {
        op: ObjectStoreOperationType,
        value_name: String,
        path: String,
    },
}

impl EventSpecificData {
    /// Stable snake_case name, used as the indexed column in event storage
    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::PipelineStart => "pipeline_start",
            Self::PipelineSuccess => "pipeline_success",
            Self::PipelineFailure => "pipeline_failure",
            Self::StepStart => "step_start",
            Self::StepSuccess => "step_success",
            Self::StepFailure { .. } => "step_failure",
            Self::StepSkipped => "step_skipped",
            Self::ObjectStoreOperation { .. } => "object_store_operation",
        }
    }
}

/// A single event in a run's trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub run_id: String,
    pub pipeline_name: String,
    pub step_key: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub event: EventSpecificData,
}

impl PipelineEvent {
    pub fn new(
        run_id: impl Into<String>,
        pipeline_name: impl Into<String>,
        step_key: Option<String>,
        event: EventSpecificData,
    ) -> Self {
        let step_key_label = step_key.as_deref().unwrap_or("<pipeline>");
        let message = match &event {
            EventSpecificData::StepFailure { error } => {
                format!("Execution of step \"{step_key_label}\" failed: {error}")
            }
            EventSpecificData::ObjectStoreOperation {
                op,
                value_name,
                path,
            } => format!("{op} \"{value_name}\" at {path} for step \"{step_key_label}\""),
            other => format!("{} for {step_key_label}", other.event_type_name()),
        };

        Self {
            run_id: run_id.into(),
            pipeline_name: pipeline_name.into(),
            step_key,
            timestamp: Utc::now(),
            message,
            event,
        }
    }

    pub fn pipeline(
        run_id: impl Into<String>,
        pipeline_name: impl Into<String>,
        event: EventSpecificData,
    ) -> Self {
        Self::new(run_id, pipeline_name, None, event)
    }

    pub fn step(
        run_id: impl Into<String>,
        pipeline_name: impl Into<String>,
        step_key: impl Into<String>,
        event: EventSpecificData,
    ) -> Self {
        Self::new(run_id, pipeline_name, Some(step_key.into()), event)
    }

    pub fn event_type_name(&self) -> &'static str {
        self.event.event_type_name()
    }

    pub fn is_step_success(&self) -> bool {
        matches!(self.event, EventSpecificData::StepSuccess)
    }

    pub fn is_step_failure(&self) -> bool {
        matches!(self.event, EventSpecificData::StepFailure { .. })
    }

    pub fn is_pipeline_failure(&self) -> bool {
        matches!(self.event, EventSpecificData::PipelineFailure)
    }

    /// `(op, value_name)` when this is an object store operation
    pub fn object_store_operation(&self) -> Option<(ObjectStoreOperationType, &str)> {
        match &self.event {
            EventSpecificData::ObjectStoreOperation { op, value_name, .. } => {
                Some((*op, value_name.as_str()))
            }
            _ => None,
        }
    }
}

/// Ordered, shareable collector of the events a run emits.
///
/// Cloning yields another handle to the same trail, so workers spawned on separate
/// tasks append to one sequence. When backed by event log storage, each event is
/// stored before it becomes visible in the trail, and stored events keep trail
/// order.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
    storage: Option<Arc<dyn EventLogStorage>>,
}

impl EventSink {
    /// Sink that only collects in memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that writes every recorded event through to `storage`
    pub fn persisting_to(storage: Arc<dyn EventLogStorage>) -> Self {
        Self {
            events: Arc::default(),
            storage: Some(storage),
        }
    }

    pub async fn record(&self, event: PipelineEvent) -> Result<()> {
        let mut events = self.events.lock().await;
        if let Some(storage) = &self.storage {
            storage.store_event(&event).await?;
        }
        events.push(event);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    /// Copy of every event recorded so far, in recording order
    pub async fn snapshot(&self) -> Vec<PipelineEvent> {
        self.events.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryEventLogStorage;
    use serde_json::json;

    #[test]
    fn test_event_type_tag_in_json() {
        let event = PipelineEvent::step(
            "r1",
            "etl",
            "load",
            EventSpecificData::ObjectStoreOperation {
                op: ObjectStoreOperationType::SetObject,
                value_name: "result".to_string(),
                path: "/tmp/r1/load/result".to_string(),
            },
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"]["event_type"], json!("object_store_operation"));
        assert_eq!(value["event"]["op"], json!("SET_OBJECT"));
        assert!(event.message.contains("SET_OBJECT"));

        let restored: PipelineEvent = serde_json::from_value(value).unwrap();
        assert_eq!(restored, event);
        assert_eq!(
            restored.object_store_operation(),
            Some((ObjectStoreOperationType::SetObject, "result"))
        );
    }

    #[tokio::test]
    async fn test_sink_clones_share_trail() {
        let sink = EventSink::new();
        let worker = sink.clone();

        sink.record(PipelineEvent::pipeline("r1", "etl", EventSpecificData::PipelineStart))
            .await
            .unwrap();
        worker
            .record(PipelineEvent::step("r1", "etl", "a", EventSpecificData::StepStart))
            .await
            .unwrap();

        assert_eq!(sink.len().await, 2);
        assert_eq!(sink.snapshot().await[1].step_key.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_sink_writes_through_to_storage() {
        let storage = Arc::new(InMemoryEventLogStorage::new());
        let sink = EventSink::persisting_to(storage.clone());

        sink.record(PipelineEvent::step("r1", "etl", "a", EventSpecificData::StepSuccess))
            .await
            .unwrap();

        assert_eq!(storage.get_logs_for_run("r1").await.unwrap(), sink.snapshot().await);
    }
}
