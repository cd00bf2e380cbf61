pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod service;
pub mod source;

pub use config::NotifierConfig;
pub use delivery::{Channel, Channels, HttpMailRelay, LogMailer, QueueChannel, WebhookChannel};
pub use dispatcher::{
    ClaimTracker, DispatchReport, DispatchResult, Dispatcher, FailedDelivery,
};
pub use error::{ConfigError, DeliveryError, NotifierError, RegistryLoadError, SourceError};
pub use filter::FilterPolicy;
pub use pipeline::{Pipeline, PipelineReport};
pub use registry::{RegistrySnapshot, SubscriberRegistry, Topic, TopicConfig};
pub use retry::RetryPolicy;
pub use service::Notifier;
pub use source::{EventSource, EventStream, ReceivedEvent, Settlement, StreamCloser};
