use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jobwatch_dedup::{Claim, DedupState, DedupStore};
use jobwatch_domain::{DedupeKey, JobEvent, NotificationPayload, Subscriber};
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::delivery::Channels;
use crate::error::{DeliveryError, NotifierError};
use crate::filter::FilterPolicy;
use crate::registry::SubscriberRegistry;
use crate::retry::{Attempted, RetryPolicy, retry_with_backoff};

/// What a call to [`Dispatcher::dispatch`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// A notification cycle ran.
    Dispatched(DispatchReport),
    /// A live cycle already exists for this run; nobody was contacted.
    Deduplicated {
        dedupe_key: DedupeKey,
        state: DedupState,
    },
    /// The event is not notifiable; nobody was contacted.
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub dedupe_key: DedupeKey,
    pub topic: String,
    pub registry_version: u64,
    /// In registry order.
    pub delivered: Vec<Subscriber>,
    /// In registry order.
    pub failed: Vec<FailedDelivery>,
    /// Inactive subscribers that were not contacted.
    pub skipped: usize,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelivery {
    pub subscriber: Subscriber,
    /// Last error seen.
    pub error: DeliveryError,
    pub attempts: u32,
}

/// Shared flag that is set while a dispatch holds the dedup claim for its
/// key. Lets the owner of an aborted dispatch release an orphaned claim.
#[derive(Debug, Clone, Default)]
pub struct ClaimTracker(Arc<AtomicBool>);

impl ClaimTracker {
    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, held: bool) {
        self.0.store(held, Ordering::Release);
    }
}

/// Fans one qualifying event out to every active subscriber of a topic,
/// at most once per `(job_name, run_id)` within the dedup retention.
pub struct Dispatcher {
    topic: String,
    filter: Arc<FilterPolicy>,
    registry: Arc<SubscriberRegistry>,
    dedup: Arc<dyn DedupStore>,
    channels: Channels,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        topic: impl Into<String>,
        filter: Arc<FilterPolicy>,
        registry: Arc<SubscriberRegistry>,
        dedup: Arc<dyn DedupStore>,
        channels: Channels,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            topic: topic.into(),
            filter,
            registry,
            dedup,
            channels,
            retry,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn filter(&self) -> &Arc<FilterPolicy> {
        &self.filter
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn dedup(&self) -> &Arc<dyn DedupStore> {
        &self.dedup
    }

    /// Run one notification cycle for `event`.
    ///
    /// The dedup entry is claimed before any delivery starts. A crash
    /// between the claim and the final `finish` leaves the entry in
    /// `Dispatching`, and redelivery inside the retention window is then
    /// suppressed; a crash before the claim lets the upstream redelivery
    /// notify again.
    pub async fn dispatch(&self, event: &JobEvent) -> Result<DispatchResult, NotifierError> {
        self.dispatch_tracked(event, &ClaimTracker::default()).await
    }

    /// [`dispatch`](Self::dispatch), reporting claim ownership through
    /// `claim`.
    pub async fn dispatch_tracked(
        &self,
        event: &JobEvent,
        claim: &ClaimTracker,
    ) -> Result<DispatchResult, NotifierError> {
        let payload = NotificationPayload::from_event(event);
        let span = tracing::info_span!(
            "dispatch",
            job_name = %event.job_name,
            run_id = %event.run_id,
            dedupe_key = %payload.dedupe_key(),
        );
        self.dispatch_payload(payload, claim).instrument(span).await
    }

    async fn dispatch_payload(
        &self,
        payload: NotificationPayload,
        claim: &ClaimTracker,
    ) -> Result<DispatchResult, NotifierError> {
        let event = payload.event();
        if !self.filter.is_notifiable(event) {
            tracing::warn!(state = %event.state, "refusing to dispatch non-notifiable event");
            return Ok(DispatchResult::Rejected {
                reason: format!("state {} is not notifiable", event.state),
            });
        }

        let key = payload.dedupe_key().clone();
        if let Claim::Duplicate(state) = self.dedup.try_claim(key.as_str()).await? {
            tracing::info!(%state, "duplicate event suppressed");
            return Ok(DispatchResult::Deduplicated {
                dedupe_key: key,
                state,
            });
        }
        claim.set(true);

        let snapshot = self.registry.snapshot();
        let Some(topic) = snapshot.topic(&self.topic) else {
            self.dedup.release(key.as_str()).await?;
            claim.set(false);
            return Err(NotifierError::UnknownTopic(self.topic.clone()));
        };

        let payload = Arc::new(payload);
        let mut fan_out = JoinSet::new();
        let mut targets = HashMap::new();
        let mut skipped = 0;
        for (index, subscriber) in topic.subscribers().iter().enumerate() {
            if !subscriber.active {
                skipped += 1;
                continue;
            }
            let channel = self.channels.for_protocol(subscriber.protocol);
            let target = subscriber.clone();
            let payload = payload.clone();
            let retry = self.retry.clone();
            let task = fan_out.spawn(async move {
                retry_with_backoff(&retry, |_| channel.deliver(&target, &payload)).await
            });
            targets.insert(task.id(), (index, subscriber.clone()));
        }

        if fan_out.is_empty() {
            tracing::warn!(topic = %self.topic, "topic has no active subscribers");
        }

        let mut results = Vec::with_capacity(fan_out.len());
        while let Some(joined) = fan_out.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(error = %e, "delivery task panicked");
                    let outcome = Attempted {
                        result: Err(DeliveryError::Permanent("delivery task panicked".into())),
                        attempts: 1,
                    };
                    (e.id(), outcome)
                }
            };
            if let Some((index, subscriber)) = targets.remove(&id) {
                results.push((index, subscriber, outcome));
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (_, subscriber, Attempted { result, attempts }) in results {
            match result {
                Ok(()) => delivered.push(subscriber),
                Err(error) => {
                    tracing::warn!(
                        subscriber = %subscriber,
                        attempts,
                        error = %error,
                        "delivery failed"
                    );
                    failed.push(FailedDelivery {
                        subscriber,
                        error,
                        attempts,
                    });
                }
            }
        }

        let final_state = if failed.is_empty() {
            DedupState::Completed
        } else {
            DedupState::PartiallyFailed
        };
        if let Err(e) = self.dedup.finish(key.as_str(), final_state).await {
            tracing::warn!(error = %e, state = %final_state, "failed to record dispatch outcome");
        }
        claim.set(false);

        tracing::info!(
            delivered = delivered.len(),
            failed = failed.len(),
            skipped,
            state = %final_state,
            "dispatch finished"
        );

        Ok(DispatchResult::Dispatched(DispatchReport {
            dedupe_key: key,
            topic: self.topic.clone(),
            registry_version: snapshot.version(),
            delivered,
            failed,
            skipped,
        }))
    }
}
