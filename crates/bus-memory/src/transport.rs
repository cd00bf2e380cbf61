use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use jobwatch_bus::{
    Envelope, MessageHandler, PublishOpts, StartPosition, SubscribeOpts, TransportError,
};

use crate::consumer::{ConsumerParams, run_consumer_loop};
use crate::store::{ConsumerGroup, SharedStore, SubjectStore};
use crate::subscription::MemorySubscription;

#[derive(Debug, Clone)]
pub struct MemoryTransportConfig {
    pub max_payload_size: usize,
}

impl Default for MemoryTransportConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 256 * 1024,
        }
    }
}

/// Single-process bus. Every subject is an unbounded in-memory log with
/// independent consumer groups.
pub struct MemoryTransport {
    store: SharedStore,
    config: MemoryTransportConfig,
    closed: AtomicBool,
}

impl MemoryTransport {
    #[must_use]
    pub fn new(config: MemoryTransportConfig) -> Self {
        Self {
            store: Arc::new(Mutex::new(SubjectStore::new())),
            config,
            closed: AtomicBool::new(false),
        }
    }

    /// Everything ever published on `subject`, in publish order.
    pub async fn retained(&self, subject: &str) -> Vec<Envelope> {
        let store = self.store.lock().await;
        store
            .subjects
            .get(subject)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Messages on `subject` that `group` has not yet settled: unread ones
    /// plus delivered-but-unacked ones. A group that never subscribed
    /// counts the whole log.
    pub async fn backlog(&self, subject: &str, group: &str) -> usize {
        let store = self.store.lock().await;
        let Some(log) = store.subjects.get(subject) else {
            return 0;
        };
        match log.groups.get(group) {
            Some(consumer) => {
                let read = consumer.cursor.map_or(0, |c| c + 1);
                log.messages.len().saturating_sub(read) + consumer.pending.len()
            }
            None => log.messages.len(),
        }
    }

    fn check_closed(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(MemoryTransportConfig::default())
    }
}

#[async_trait]
impl jobwatch_bus::Transport for MemoryTransport {
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        opts: Option<PublishOpts>,
    ) -> Result<String, TransportError> {
        self.check_closed()?;

        if payload.len() > self.config.max_payload_size {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let envelope = Envelope::new(subject, payload, opts.and_then(|o| o.trace_id));
        let message_id = envelope.message_id.clone();
        self.store.lock().await.append(envelope);
        Ok(message_id)
    }

    async fn subscribe(
        &self,
        subject: &str,
        group: &str,
        handler: Box<dyn MessageHandler>,
        opts: Option<SubscribeOpts>,
    ) -> Result<Box<dyn jobwatch_bus::Subscription>, TransportError> {
        self.check_closed()?;

        let opts = opts.unwrap_or_default();
        let token = CancellationToken::new();
        let active = Arc::new(AtomicBool::new(true));

        let notify = {
            let mut store = self.store.lock().await;
            let log = store.log_mut(subject);
            let cursor = match opts.start_from {
                StartPosition::Latest => log.messages.len().checked_sub(1),
                StartPosition::Earliest => None,
            };
            log.groups
                .entry(group.to_string())
                .or_insert_with(|| ConsumerGroup::new(cursor));
            log.notify.clone()
        };

        tracing::debug!(%subject, %group, "memory bus subscription started");

        tokio::spawn(run_consumer_loop(ConsumerParams {
            store: self.store.clone(),
            subject: subject.to_string(),
            group: group.to_string(),
            handler,
            opts,
            token: token.clone(),
            active: active.clone(),
            notify,
        }));

        Ok(Box::new(MemorySubscription { token, active }))
    }

    async fn ping(&self) -> Result<bool, TransportError> {
        Ok(!self.closed.load(Ordering::Acquire))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
