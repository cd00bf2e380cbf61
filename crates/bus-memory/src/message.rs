use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use jobwatch_bus::{Envelope, TransportError};

use crate::store::{SharedStore, dead_letter_subject};

#[derive(Clone)]
pub(crate) struct MemoryMessage {
    pub(crate) envelope: Envelope,
    pub(crate) group: String,
    pub(crate) store: SharedStore,
    pub(crate) settled: Arc<AtomicBool>,
}

impl MemoryMessage {
    /// First settle wins; returns false if already acked/naked/dead-lettered.
    fn settle(&self) -> bool {
        !self.settled.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }
}

#[async_trait]
impl jobwatch_bus::Message for MemoryMessage {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn payload(&self) -> &Bytes {
        &self.envelope.payload
    }

    async fn ack(&self) -> Result<(), TransportError> {
        if !self.settle() {
            return Ok(());
        }
        let mut store = self.store.lock().await;
        if let Some(group) = store.group_mut(&self.envelope.subject, &self.group) {
            group.pending.remove(&self.envelope.message_id);
        }
        Ok(())
    }

    /// The message stays pending until it is redelivered, so a delayed nak
    /// still counts towards the group's backlog.
    async fn nak(&self, delay: Option<Duration>) -> Result<(), TransportError> {
        if !self.settle() {
            return Ok(());
        }
        match delay.filter(|d| !d.is_zero()) {
            None => requeue(&self.store, &self.envelope, &self.group).await,
            Some(delay) => {
                let (store, envelope, group) =
                    (self.store.clone(), self.envelope.clone(), self.group.clone());
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    requeue(&store, &envelope, &group).await;
                });
            }
        }
        Ok(())
    }

    async fn dead_letter(&self, reason: &str) -> Result<(), TransportError> {
        if !self.settle() {
            return Ok(());
        }

        let record = serde_json::json!({
            "original_envelope": serde_json::to_value(&self.envelope)?,
            "reason": reason,
        });
        let dl_envelope = Envelope::new(
            dead_letter_subject(&self.envelope.subject),
            Bytes::from(record.to_string()),
            self.envelope.trace_id.clone(),
        );

        let mut store = self.store.lock().await;
        store.append(dl_envelope);
        if let Some(group) = store.group_mut(&self.envelope.subject, &self.group) {
            group.pending.remove(&self.envelope.message_id);
        }
        Ok(())
    }

    fn detach(&self) -> Box<dyn jobwatch_bus::Message> {
        Box::new(self.clone())
    }
}

async fn requeue(store: &SharedStore, envelope: &Envelope, group: &str) {
    let mut store = store.lock().await;
    if let Some(consumer) = store.group_mut(&envelope.subject, group) {
        consumer.redeliver.push_back(envelope.message_id.clone());
    }
}
