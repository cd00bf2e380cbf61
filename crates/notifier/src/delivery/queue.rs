use async_trait::async_trait;
use jobwatch_bus::{EventEmitter, TransportError};
use jobwatch_domain::{NotificationPayload, Subscriber, subjects};

use super::Channel;
use crate::error::DeliveryError;

const SCHEMA_VERSION: u32 = 1;

/// Enqueues the notification on the bus subject backing the named queue,
/// wrapped in a `DomainPayload` whose id is the dedupe key.
pub struct QueueChannel {
    emitter: EventEmitter,
}

impl QueueChannel {
    pub fn new(emitter: EventEmitter) -> Self {
        Self { emitter }
    }
}

fn classify(err: TransportError) -> DeliveryError {
    match err {
        TransportError::PayloadTooLarge { .. }
        | TransportError::Serialization(_)
        | TransportError::Closed => DeliveryError::Permanent(err.to_string()),
        other => DeliveryError::Transient(other.to_string()),
    }
}

#[async_trait]
impl Channel for QueueChannel {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        let subject = subjects::queues::named(&subscriber.endpoint);
        let message_id = self
            .emitter
            .emit(
                &subject,
                SCHEMA_VERSION,
                payload.dedupe_key().as_str(),
                payload.webhook_body(),
            )
            .await
            .map_err(classify)?;
        tracing::debug!(%subject, %message_id, "notification enqueued");
        Ok(())
    }
}
