use std::path::PathBuf;
use std::time::Duration;

use jobwatch_bus::TransportError;
use jobwatch_dedup::DedupError;
use jobwatch_domain::DomainError;
use thiserror::Error;

/// Outcome of a failed delivery attempt to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Network or service trouble; worth retrying.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// The endpoint rejected the notification or cannot be reached by
    /// construction (bad URL, 4xx). Never retried.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),

    #[error("delivery attempt timed out after {0:?}")]
    Timeout(Duration),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Permanent(_))
    }
}

#[derive(Debug, Error)]
pub enum RegistryLoadError {
    #[error("registry has no topics")]
    Empty,

    #[error("topic name is empty")]
    EmptyTopicName,

    #[error("duplicate topic {0:?}")]
    DuplicateTopic(String),

    #[error("unknown topic {0:?}")]
    UnknownTopic(String),

    #[error("topic {topic:?}: {source}")]
    InvalidSubscriber {
        topic: String,
        #[source]
        source: DomainError,
    },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("event source already handed out its stream")]
    AlreadyReceived,

    #[error("subscribe failed: {0}")]
    Subscribe(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("dedup store: {0}")]
    Dedup(#[from] DedupError),

    #[error("registry: {0}")]
    Registry(#[from] RegistryLoadError),

    #[error("dispatch topic {0:?} is not in the registry")]
    UnknownTopic(String),

    #[error("event source: {0}")]
    Source(#[from] SourceError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0} did not answer a ping")]
    Unreachable(&'static str),
}
