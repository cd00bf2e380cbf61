use chrono::{DateTime, Utc};

use crate::ids::{JobName, RunId};
use crate::state::JobState;

/// One observed lifecycle transition of a batch job run.
///
/// This is also the native wire shape accepted by the event source
/// adapter (camelCase JSON).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_name: JobName,
    /// Unique per execution attempt.
    pub run_id: RunId,
    pub state: JobState,
    pub timestamp: DateTime<Utc>,
    /// Origin system identifier, e.g. `aws.glue`.
    pub source: String,
    /// Failure detail reported by the runner, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Upstream event id, if the runner assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl JobEvent {
    pub fn new(
        job_name: JobName,
        run_id: RunId,
        state: JobState,
        timestamp: DateTime<Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            job_name,
            run_id,
            state,
            timestamp,
            source: source.into(),
            message: None,
            event_id: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_shape_is_camel_case() {
        let event = JobEvent::new(
            JobName::new("etl-1").unwrap(),
            RunId::new("r1").unwrap(),
            JobState::Failed,
            "2024-03-01T20:00:00Z".parse().unwrap(),
            "batch-runner",
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["jobName"], "etl-1");
        assert_eq!(json["runId"], "r1");
        assert_eq!(json["state"], "FAILED");
        assert_eq!(json["source"], "batch-runner");
        assert!(json.get("message").is_none());
        assert!(json.get("eventId").is_none());
    }

    #[test]
    fn builders_set_optional_fields() {
        let event = JobEvent::new(
            JobName::new("etl-1").unwrap(),
            RunId::new("r1").unwrap(),
            JobState::Failed,
            Utc::now(),
            "batch-runner",
        )
        .with_message("OOM on executor 3")
        .with_event_id("evt-9");
        assert_eq!(event.message.as_deref(), Some("OOM on executor 3"));
        assert_eq!(event.event_id.as_deref(), Some("evt-9"));
    }
}
