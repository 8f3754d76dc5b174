//! Outcome of a pipeline run as seen through its event trail.

use serde::{Deserialize, Serialize};

use super::events::PipelineEvent;
use crate::error::Result;
use crate::instance::Instance;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineExecutionResult {
    run_id: String,
    pipeline_name: String,
    events: Vec<PipelineEvent>,
}

impl PipelineExecutionResult {
    pub fn new(
        run_id: impl Into<String>,
        pipeline_name: impl Into<String>,
        events: Vec<PipelineEvent>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            pipeline_name: pipeline_name.into(),
            events,
        }
    }

    /// Rebuild the result of a finished run from the instance's event log.
    pub async fn from_event_log(
        instance: &Instance,
        pipeline_name: impl Into<String>,
        run_id: &str,
    ) -> Result<Self> {
        let events = instance.event_storage().get_logs_for_run(run_id).await?;
        Ok(Self::new(run_id, pipeline_name, events))
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    /// True when no step and not the pipeline itself reported a failure
    pub fn success(&self) -> bool {
        !self
            .events
            .iter()
            .any(|event| event.is_step_failure() || event.is_pipeline_failure())
    }

    /// Step events grouped by step key.
    ///
    /// Groups are ordered by each step's first event; events keep their trail order
    /// within a group. Pipeline-level events are not included.
    pub fn events_by_step_key(&self) -> Vec<(&str, Vec<&PipelineEvent>)> {
        let mut groups: Vec<(&str, Vec<&PipelineEvent>)> = Vec::new();

        for event in &self.events {
            let Some(step_key) = event.step_key.as_deref() else {
                continue;
            };
            match groups.iter_mut().find(|(key, _)| *key == step_key) {
                Some((_, events)) => events.push(event),
                None => groups.push((step_key, vec![event])),
            }
        }

        groups
    }

    pub fn step_events(&self, step_key: &str) -> Vec<&PipelineEvent> {
        self.events
            .iter()
            .filter(|event| event.step_key.as_deref() == Some(step_key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::EventSpecificData;

    #[test]
    fn test_grouping_keeps_first_appearance_order() {
        let result = PipelineExecutionResult::new(
            "r1",
            "etl",
            vec![
                PipelineEvent::pipeline("r1", "etl", EventSpecificData::PipelineStart),
                PipelineEvent::step("r1", "etl", "b", EventSpecificData::StepStart),
                PipelineEvent::step("r1", "etl", "a", EventSpecificData::StepStart),
                PipelineEvent::step("r1", "etl", "b", EventSpecificData::StepSuccess),
                PipelineEvent::step(
                    "r1",
                    "etl",
                    "a",
                    EventSpecificData::StepFailure {
                        error: "bad input".to_string(),
                    },
                ),
            ],
        );

        let groups = result.events_by_step_key();
        let keys: Vec<_> = groups.iter().map(|(key, _)| *key).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert!(groups[0].1[1].is_step_success());
        assert_eq!(result.step_events("a").len(), 2);
        assert!(!result.success());
    }
}
