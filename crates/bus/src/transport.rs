use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::envelope::Envelope;
use crate::error::TransportError;

/// Event bus connection. Created once at startup and shared by the
/// event source adapter and the queue delivery channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish `payload` on `subject`. Returns the bus-assigned message id.
    async fn publish(
        &self,
        subject: &str,
        payload: Bytes,
        opts: Option<PublishOpts>,
    ) -> Result<String, TransportError>;

    /// Attach `handler` to `subject` as a member of consumer `group`.
    /// Messages a handler neither acks nor naks stay pending.
    async fn subscribe(
        &self,
        subject: &str,
        group: &str,
        handler: Box<dyn MessageHandler>,
        opts: Option<SubscribeOpts>,
    ) -> Result<Box<dyn Subscription>, TransportError>;

    async fn ping(&self) -> Result<bool, TransportError>;

    async fn close(&self) -> Result<(), TransportError>;
}

/// A delivered bus message. Settle it exactly once with `ack`, `nak` or
/// `dead_letter`; later calls are no-ops.
#[async_trait]
pub trait Message: Send + Sync {
    fn envelope(&self) -> &Envelope;
    fn payload(&self) -> &Bytes;
    async fn ack(&self) -> Result<(), TransportError>;
    async fn nak(&self, delay: Option<Duration>) -> Result<(), TransportError>;
    async fn dead_letter(&self, reason: &str) -> Result<(), TransportError>;
    /// An owned handle on the same message, for settling it after the
    /// handler has returned. Settling either one settles both.
    fn detach(&self) -> Box<dyn Message>;
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: &dyn Message) -> Result<(), TransportError>;
}

/// Handle returned by subscribe.
#[async_trait]
pub trait Subscription: Send + Sync {
    async fn unsubscribe(&self) -> Result<(), TransportError>;
    fn is_active(&self) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct PublishOpts {
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SubscribeOpts {
    pub batch_size: u32,
    pub max_inflight: u32,
    pub start_from: StartPosition,
}

impl Default for SubscribeOpts {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_inflight: 100,
            start_from: StartPosition::Latest,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StartPosition {
    Latest,
    Earliest,
}
