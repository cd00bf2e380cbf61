use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use jobwatch_bus::{
    Message, MessageHandler, StartPosition, SubscribeOpts, Subscription, Transport,
    TransportError,
};
use jobwatch_domain::{JobEvent, MalformedEventError, decode_event};
use tokio::sync::mpsc;

use crate::config::SourceSection;
use crate::error::SourceError;

type Received = Result<ReceivedEvent, MalformedEventError>;

/// A decoded event and the bus message it came from. The message stays
/// pending on the bus until its [`Settlement`] is used.
pub struct ReceivedEvent {
    pub event: JobEvent,
    pub settlement: Settlement,
}

/// Acks or naks one bus message. The first call wins; later ones are no-ops.
pub struct Settlement {
    message: Box<dyn Message>,
}

impl Settlement {
    pub fn message_id(&self) -> &str {
        &self.message.envelope().message_id
    }

    pub async fn ack(&self) -> Result<(), TransportError> {
        self.message.ack().await
    }

    /// Hand the message back for redelivery after `delay`.
    pub async fn nak(&self, delay: Option<Duration>) -> Result<(), TransportError> {
        self.message.nak(delay).await
    }
}

/// Turns bus messages on the job-state subject into [`JobEvent`]s.
pub struct EventSource {
    transport: Arc<dyn Transport>,
    subject: String,
    group: String,
    buffer: usize,
    received: AtomicBool,
}

impl EventSource {
    pub fn new(transport: Arc<dyn Transport>, config: &SourceSection) -> Self {
        Self {
            transport,
            subject: config.subject.clone(),
            group: config.group.clone(),
            buffer: config.buffer.max(1),
            received: AtomicBool::new(false),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Subscribe and hand out the event stream. Can only be called once.
    ///
    /// Valid events stay pending on the bus until the consumer settles
    /// them, so at most `buffer` events are unsettled at once. Malformed
    /// ones are dead-lettered with the parse reason and yielded as `Err`,
    /// so the stream never ends on bad input.
    pub async fn receive(&self) -> Result<EventStream, SourceError> {
        if self.received.swap(true, Ordering::AcqRel) {
            return Err(SourceError::AlreadyReceived);
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        let opts = SubscribeOpts {
            start_from: StartPosition::Earliest,
            max_inflight: u32::try_from(self.buffer).unwrap_or(u32::MAX),
            ..SubscribeOpts::default()
        };
        let subscription = self
            .transport
            .subscribe(
                &self.subject,
                &self.group,
                Box::new(DecodingHandler { tx }),
                Some(opts),
            )
            .await?;

        tracing::info!(subject = %self.subject, group = %self.group, "event source subscribed");
        Ok(EventStream {
            rx,
            subscription: Arc::from(subscription),
        })
    }
}

/// Lazy, unbounded stream of decoded job events.
///
/// Ends only after [`close`](Self::close), once buffered events drain.
pub struct EventStream {
    rx: mpsc::Receiver<Received>,
    subscription: Arc<dyn Subscription>,
}

impl EventStream {
    /// Stop consuming from the bus. Already-buffered events stay readable.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.subscription.unsubscribe().await
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// A handle that can end the stream from another task, e.g. once the
    /// upstream producer is known to be finished.
    pub fn closer(&self) -> StreamCloser {
        StreamCloser {
            subscription: self.subscription.clone(),
        }
    }
}

#[derive(Clone)]
pub struct StreamCloser {
    subscription: Arc<dyn Subscription>,
}

impl StreamCloser {
    pub async fn close(&self) -> Result<(), TransportError> {
        self.subscription.unsubscribe().await
    }
}

impl Stream for EventStream {
    type Item = Received;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Received>> {
        self.rx.poll_recv(cx)
    }
}

struct DecodingHandler {
    tx: mpsc::Sender<Received>,
}

#[async_trait]
impl MessageHandler for DecodingHandler {
    async fn handle(&self, msg: &dyn Message) -> Result<(), TransportError> {
        match decode_event(msg.payload()) {
            Ok(event) => {
                let received = ReceivedEvent {
                    event,
                    settlement: Settlement {
                        message: msg.detach(),
                    },
                };
                if self.tx.send(Ok(received)).await.is_err() {
                    msg.nak(None).await?;
                    return Err(TransportError::Other("event stream dropped".to_string()));
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    message_id = %msg.envelope().message_id,
                    error = %err,
                    "dropping malformed job event"
                );
                msg.dead_letter(&err.to_string()).await?;
                // The consumer may already be gone; the message is settled either way.
                let _ = self.tx.send(Err(err)).await;
                Ok(())
            }
        }
    }
}
