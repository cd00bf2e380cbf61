use std::sync::Arc;

use serde::Serialize;

use crate::error::TransportError;
use crate::payload::DomainPayload;
use crate::transport::Transport;

/// Publishes `DomainPayload<T>`-wrapped records on the bus on behalf of
/// one named component.
pub struct EventEmitter {
    transport: Arc<dyn Transport>,
    component: String,
}

impl EventEmitter {
    pub fn new(transport: Arc<dyn Transport>, component: impl Into<String>) -> Self {
        Self {
            transport,
            component: component.into(),
        }
    }

    /// Wrap `data` with schema version and dedup id, then publish it.
    pub async fn emit<T: Serialize>(
        &self,
        subject: &str,
        schema_version: u32,
        dedup_id: impl Into<String>,
        data: T,
    ) -> Result<String, TransportError> {
        let bytes = DomainPayload::new(schema_version, dedup_id, data).to_bytes()?;
        let message_id = self.transport.publish(subject, bytes, None).await?;
        tracing::debug!(component = %self.component, %subject, %message_id, "emitted");
        Ok(message_id)
    }
}
