use thiserror::Error;

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("corrupt entry for key {key}: {value:?}")]
    Corrupt { key: String, value: String },

    #[error("{0}")]
    Other(String),
}
