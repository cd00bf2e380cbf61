/// Validation errors for domain values.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("invalid job name: {0:?}")]
    InvalidJobName(String),

    #[error("invalid run id: {0:?}")]
    InvalidRunId(String),

    #[error("unknown job state: {0:?}")]
    UnknownState(String),

    #[error("invalid {protocol} endpoint: {endpoint:?}")]
    InvalidEndpoint { protocol: String, endpoint: String },
}

/// An inbound event that could not be normalized into a `JobEvent`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed job event: {reason}")]
pub struct MalformedEventError {
    pub reason: String,
}

impl MalformedEventError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<DomainError> for MalformedEventError {
    fn from(e: DomainError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<serde_json::Error> for MalformedEventError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(e.to_string())
    }
}
