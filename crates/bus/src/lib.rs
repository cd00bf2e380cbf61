mod emitter;
mod envelope;
mod error;
mod payload;
mod transport;

pub use emitter::EventEmitter;
pub use envelope::Envelope;
pub use error::TransportError;
pub use payload::DomainPayload;
pub use transport::{
    Message, MessageHandler, PublishOpts, StartPosition, SubscribeOpts, Subscription, Transport,
};

/// Milliseconds since the unix epoch; 0 if the clock is before it.
#[allow(clippy::cast_possible_truncation)] // millis since epoch fits in u64 until year 584556
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
