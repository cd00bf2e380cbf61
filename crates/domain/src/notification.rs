use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::event::JobEvent;
use crate::ids::{JobName, RunId};
use crate::state::JobState;

/// Deterministic identity of one job run for duplicate suppression.
///
/// Lowercase hex SHA-256 over `job_name`, a NUL separator, and `run_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DedupeKey(String);

impl DedupeKey {
    pub fn derive(job_name: &JobName, run_id: &RunId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(job_name.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(run_id.as_str().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DedupeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The notification fanned out for one qualifying event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    subject: String,
    body: String,
    dedupe_key: DedupeKey,
    event: JobEvent,
}

/// JSON document POSTed to webhook subscribers and enqueued for queue
/// subscribers.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBody {
    pub job_name: String,
    pub run_id: String,
    pub state: JobState,
    pub timestamp: DateTime<Utc>,
    pub dedupe_key: String,
}

impl NotificationPayload {
    pub fn from_event(event: &JobEvent) -> Self {
        let dedupe_key = DedupeKey::derive(&event.job_name, &event.run_id);
        Self {
            subject: format!(
                "Batch job has {}: {}",
                outcome_phrase(event.state),
                event.job_name
            ),
            body: render_body(event),
            dedupe_key,
            event: event.clone(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn dedupe_key(&self) -> &DedupeKey {
        &self.dedupe_key
    }

    pub fn event(&self) -> &JobEvent {
        &self.event
    }

    pub fn webhook_body(&self) -> WebhookBody {
        WebhookBody {
            job_name: self.event.job_name.to_string(),
            run_id: self.event.run_id.to_string(),
            state: self.event.state,
            timestamp: self.event.timestamp,
            dedupe_key: self.dedupe_key.to_string(),
        }
    }
}

fn outcome_phrase(state: JobState) -> &'static str {
    match state {
        JobState::Failed => "failed",
        JobState::Timeout => "timed out",
        JobState::Stopped => "stopped",
        JobState::Succeeded => "succeeded",
        JobState::Starting => "started",
        JobState::Running => "started running",
    }
}

fn render_body(event: &JobEvent) -> String {
    let rule = "-".repeat(72);
    format!(
        "The batch job '{job}' has {phrase} and needs attention.\n\
         \n\
         {rule}\n\
         Job name:     {job}\n\
         Job state:    {state}\n\
         Event id:     {event_id}\n\
         Run id:       {run_id}\n\
         Reported at:  {time}\n\
         Source:       {source}\n\
         Error:        {message}\n\
         {rule}\n\
         \n\
         Please investigate the run and take corrective action.\n",
        job = event.job_name,
        phrase = outcome_phrase(event.state),
        state = event.state,
        event_id = event.event_id.as_deref().unwrap_or("-"),
        run_id = event.run_id,
        time = event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        source = event.source,
        message = event.message.as_deref().unwrap_or("(no message reported)"),
    )
}
