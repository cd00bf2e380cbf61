mod consumer;
mod message;
mod store;
mod subscription;
mod transport;

pub use store::dead_letter_subject;
pub use transport::{MemoryTransport, MemoryTransportConfig};
