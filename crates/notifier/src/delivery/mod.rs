//! Per-protocol delivery of a notification to one subscriber.

mod email;
mod http;
mod queue;
mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use jobwatch_domain::{NotificationPayload, Protocol, Subscriber};

use crate::error::DeliveryError;

pub use email::{HttpMailRelay, LogMailer};
pub use queue::QueueChannel;
pub use webhook::WebhookChannel;

/// Sends one notification to one subscriber. A single call is a single
/// attempt; retry and timeouts are the dispatcher's job.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError>;
}

/// One channel per protocol.
#[derive(Clone)]
pub struct Channels {
    email: Arc<dyn Channel>,
    webhook: Arc<dyn Channel>,
    queue: Arc<dyn Channel>,
}

impl Channels {
    pub fn new(
        email: Arc<dyn Channel>,
        webhook: Arc<dyn Channel>,
        queue: Arc<dyn Channel>,
    ) -> Self {
        Self {
            email,
            webhook,
            queue,
        }
    }

    /// The same channel for every protocol. Handy in tests.
    pub fn uniform(channel: Arc<dyn Channel>) -> Self {
        Self::new(channel.clone(), channel.clone(), channel)
    }

    pub fn for_protocol(&self, protocol: Protocol) -> Arc<dyn Channel> {
        match protocol {
            Protocol::Email => self.email.clone(),
            Protocol::Webhook => self.webhook.clone(),
            Protocol::Queue => self.queue.clone(),
        }
    }
}
