use std::sync::Arc;

use jobwatch_bus::{EventEmitter, Transport};
use jobwatch_dedup::{DedupStore, MemoryDedupStore};
use jobwatch_dedup_redis::{RedisDedupConfig, RedisDedupStore};
use tokio_util::sync::CancellationToken;

use crate::config::NotifierConfig;
use crate::delivery::{Channel, Channels, HttpMailRelay, LogMailer, QueueChannel, WebhookChannel};
use crate::dispatcher::Dispatcher;
use crate::error::{NotifierError, RegistryLoadError, SourceError};
use crate::pipeline::{Pipeline, PipelineReport};
use crate::registry::SubscriberRegistry;
use crate::source::EventSource;

const COMPONENT: &str = "jobwatch-notifier";

/// A fully wired notifier: source, pipeline and everything behind them.
pub struct Notifier {
    source: EventSource,
    pipeline: Pipeline,
}

impl Notifier {
    /// Build every component from config. Registry errors are fatal here.
    pub async fn from_config(
        config: &NotifierConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, NotifierError> {
        config.validate()?;
        if !transport.ping().await.map_err(SourceError::from)? {
            return Err(NotifierError::Unreachable("event bus"));
        }
        let registry = Arc::new(SubscriberRegistry::load(&config.topics)?);
        let topic = config
            .dispatch_topic()
            .ok_or(RegistryLoadError::Empty)?
            .to_string();

        let dedup = dedup_store(config).await?;
        if !dedup.ping().await? {
            return Err(NotifierError::Unreachable("dedup store"));
        }
        let channels = channels(config, transport.clone())?;
        let dispatcher = Dispatcher::new(
            topic,
            Arc::new(config.filter_policy()),
            registry,
            dedup,
            channels,
            config.retry_policy(),
        );

        Ok(Self::new(
            EventSource::new(transport, &config.source),
            Pipeline::new(
                Arc::new(dispatcher),
                config.grace_period(),
                config.sweep_interval(),
            ),
        ))
    }

    pub fn new(source: EventSource, pipeline: Pipeline) -> Self {
        Self { source, pipeline }
    }

    pub fn source(&self) -> &EventSource {
        &self.source
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Subscribe and process events until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<PipelineReport, NotifierError> {
        let events = self.source.receive().await?;
        Ok(self.pipeline.run(events, shutdown).await)
    }
}

async fn dedup_store(config: &NotifierConfig) -> Result<Arc<dyn DedupStore>, NotifierError> {
    let dedup = config.dedup_config();
    match &config.dedup.redis_url {
        Some(url) => {
            let store = RedisDedupStore::connect(RedisDedupConfig {
                url: url.clone(),
                key_prefix: config.dedup.redis_key_prefix.clone(),
                retention: dedup.retention,
            })
            .await?;
            tracing::info!("using redis dedup store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!(
                max_entries = dedup.max_entries,
                shards = dedup.shards,
                retention_secs = dedup.retention.as_secs(),
                "using in-memory dedup store"
            );
            Ok(Arc::new(MemoryDedupStore::new(&dedup)))
        }
    }
}

fn channels(
    config: &NotifierConfig,
    transport: Arc<dyn Transport>,
) -> Result<Channels, NotifierError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("jobwatch/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let email: Arc<dyn Channel> = match &config.email.relay_url {
        Some(url) => {
            let mut relay = HttpMailRelay::new(client.clone(), url.clone());
            if let Some(from) = &config.email.from {
                relay = relay.with_from(from.clone());
            }
            Arc::new(relay)
        }
        None => {
            tracing::warn!("no mail relay configured, email notifications will only be logged");
            Arc::new(LogMailer)
        }
    };

    Ok(Channels::new(
        email,
        Arc::new(WebhookChannel::new(client)),
        Arc::new(QueueChannel::new(EventEmitter::new(transport, COMPONENT))),
    ))
}
