//! Normalization of inbound wire events into [`JobEvent`].
//!
//! Two shapes are accepted:
//! - the native camelCase `JobEvent` JSON;
//! - the runner's state-change envelope
//!   `{id, time, source, "detail-type", detail: {jobName, state, jobRunId, message}}`.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::MalformedEventError;
use crate::event::JobEvent;
use crate::ids::{JobName, RunId};

const STATE_CHANGE_SUFFIX: &str = "Job State Change";

#[derive(Deserialize)]
struct StateChangeEnvelope {
    #[serde(default)]
    id: Option<String>,
    time: DateTime<Utc>,
    source: String,
    #[serde(rename = "detail-type")]
    detail_type: String,
    detail: StateChangeDetail,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateChangeDetail {
    job_name: String,
    state: String,
    job_run_id: String,
    #[serde(default)]
    message: Option<String>,
}

/// Decode one raw bus payload into a `JobEvent`.
pub fn decode_event(raw: &[u8]) -> Result<JobEvent, MalformedEventError> {
    let value: serde_json::Value = serde_json::from_slice(raw)?;
    if !value.is_object() {
        return Err(MalformedEventError::new("event is not a JSON object"));
    }

    let event = if value.get("detail").is_some() {
        from_state_change(serde_json::from_value(value)?)?
    } else {
        serde_json::from_value::<JobEvent>(value)?
    };

    if event.source.trim().is_empty() {
        return Err(MalformedEventError::new("event source is empty"));
    }
    Ok(event)
}

fn from_state_change(envelope: StateChangeEnvelope) -> Result<JobEvent, MalformedEventError> {
    if !envelope.detail_type.ends_with(STATE_CHANGE_SUFFIX) {
        return Err(MalformedEventError::new(format!(
            "unsupported detail-type {:?}",
            envelope.detail_type
        )));
    }

    let detail = envelope.detail;
    let mut event = JobEvent::new(
        JobName::new(&detail.job_name)?,
        RunId::new(&detail.job_run_id)?,
        detail.state.parse()?,
        envelope.time,
        envelope.source,
    );
    event.message = detail.message.filter(|m| !m.is_empty());
    event.event_id = envelope.id;
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::JobState;

    #[test]
    fn decodes_native_shape() {
        let raw = br#"{
            "jobName": "etl-1",
            "runId": "r1",
            "state": "FAILED",
            "timestamp": "2024-03-01T20:00:00Z",
            "source": "batch-runner"
        }"#;
        let event = decode_event(raw).unwrap();
        assert_eq!(event.job_name.as_str(), "etl-1");
        assert_eq!(event.run_id.as_str(), "r1");
        assert_eq!(event.state, JobState::Failed);
        assert_eq!(event.source, "batch-runner");
        assert!(event.message.is_none());
    }

    #[test]
    fn decodes_state_change_envelope() {
        let raw = br#"{
            "version": "0",
            "id": "abcdef00-1234-5678-9abc-def012345678",
            "detail-type": "Glue Job State Change",
            "source": "aws.glue",
            "account": "123456789012",
            "time": "2024-03-01T20:04:11Z",
            "region": "us-east-1",
            "resources": [],
            "detail": {
                "jobName": "job-glue-test",
                "severity": "ERROR",
                "state": "FAILED",
                "jobRunId": "jr_0123456789abcdef_attempt_1",
                "message": "Command failed with exit code 1"
            }
        }"#;
        let event = decode_event(raw).unwrap();
        assert_eq!(event.job_name.as_str(), "job-glue-test");
        assert_eq!(event.run_id.as_str(), "jr_0123456789abcdef_attempt_1");
        assert_eq!(event.state, JobState::Failed);
        assert_eq!(event.source, "aws.glue");
        assert_eq!(
            event.message.as_deref(),
            Some("Command failed with exit code 1")
        );
        assert_eq!(
            event.event_id.as_deref(),
            Some("abcdef00-1234-5678-9abc-def012345678")
        );
        assert_eq!(event.timestamp.to_rfc3339(), "2024-03-01T20:04:11+00:00");
    }

    #[test]
    fn rejects_foreign_detail_type() {
        let raw = br#"{
            "time": "2024-03-01T20:04:11Z",
            "source": "aws.ec2",
            "detail-type": "EC2 Instance State-change Notification",
            "detail": {"jobName": "x", "state": "FAILED", "jobRunId": "y"}
        }"#;
        let err = decode_event(raw).unwrap_err();
        assert!(err.reason.contains("detail-type"), "{err}");
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_event(b"{not json").is_err());
        assert!(decode_event(b"[1,2,3]").is_err());
        assert!(decode_event(b"\"FAILED\"").is_err());
    }

    #[test]
    fn rejects_missing_and_invalid_fields() {
        let missing_run = br#"{"jobName":"etl-1","state":"FAILED","timestamp":"2024-03-01T20:00:00Z","source":"s"}"#;
        assert!(decode_event(missing_run).is_err());

        let blank_name = br#"{"jobName":"","runId":"r1","state":"FAILED","timestamp":"2024-03-01T20:00:00Z","source":"s"}"#;
        assert!(decode_event(blank_name).is_err());

        let unknown_state = br#"{"jobName":"etl-1","runId":"r1","state":"EXPLODED","timestamp":"2024-03-01T20:00:00Z","source":"s"}"#;
        let err = decode_event(unknown_state).unwrap_err();
        assert!(err.reason.contains("EXPLODED"), "{err}");

        let blank_source = br#"{"jobName":"etl-1","runId":"r1","state":"FAILED","timestamp":"2024-03-01T20:00:00Z","source":" "}"#;
        assert!(decode_event(blank_source).is_err());
    }
}
