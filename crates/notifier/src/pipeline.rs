use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use jobwatch_domain::DedupeKey;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{ClaimTracker, DispatchResult, Dispatcher};
use crate::error::{NotifierError, RegistryLoadError};
use crate::registry::TopicConfig;
use crate::source::{EventStream, ReceivedEvent, Settlement};

type DispatchOutcome = Result<DispatchResult, NotifierError>;

/// How long a failed dispatch waits on the bus before it is redelivered.
const REDELIVERY_DELAY: Duration = Duration::from_secs(1);

/// Bookkeeping for one spawned dispatch, keyed by its task id.
struct InFlight {
    key: DedupeKey,
    claim: ClaimTracker,
    settlement: Settlement,
}

/// Counters for one [`Pipeline::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub received: u64,
    pub malformed: u64,
    pub filtered_out: u64,
    pub dispatched: u64,
    pub deduplicated: u64,
    pub rejected: u64,
    /// Subscriber deliveries that ended in failure, across all dispatches.
    pub failed_deliveries: u64,
    /// Dispatches that returned an error or panicked.
    pub errors: u64,
    /// Dispatches cut off when the shutdown grace period ran out.
    pub aborted: u64,
    /// Events handed back to the bus unprocessed, either still buffered at
    /// shutdown or after a failed or aborted dispatch.
    pub requeued: u64,
}

impl PipelineReport {
    fn record(&mut self, joined: Result<DispatchOutcome, JoinError>) {
        match joined {
            Ok(Ok(DispatchResult::Dispatched(report))) => {
                self.dispatched += 1;
                self.failed_deliveries += report.failed.len() as u64;
            }
            Ok(Ok(DispatchResult::Deduplicated { .. })) => self.deduplicated += 1,
            Ok(Ok(DispatchResult::Rejected { .. })) => self.rejected += 1,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "dispatch failed");
                self.errors += 1;
            }
            Err(e) if e.is_cancelled() => self.aborted += 1,
            Err(e) => {
                tracing::error!(error = %e, "dispatch task panicked");
                self.errors += 1;
            }
        }
    }
}

/// Consumes the event stream: filter, then one independent dispatch task
/// per qualifying event.
pub struct Pipeline {
    dispatcher: Arc<Dispatcher>,
    grace_period: Duration,
    sweep_interval: Duration,
}

impl Pipeline {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        grace_period: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            grace_period,
            sweep_interval: sweep_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Replace the subscriber registry. In-flight dispatches keep the
    /// snapshot they started with.
    pub fn reload_registry(&self, topics: &[TopicConfig]) -> Result<u64, RegistryLoadError> {
        self.dispatcher.registry().reload(topics)
    }

    /// Run until `shutdown` fires or the stream ends, then close the
    /// subscription and drain in-flight dispatches for up to the grace
    /// period. Whatever is still running after that is aborted.
    ///
    /// An event is acked only once its dispatch returned an outcome.
    /// Events still buffered at shutdown, failed dispatches and aborted
    /// ones are naked so the bus redelivers them.
    pub async fn run(
        &self,
        mut events: EventStream,
        shutdown: CancellationToken,
    ) -> PipelineReport {
        let mut report = PipelineReport::default();
        let mut in_flight: JoinSet<DispatchOutcome> = JoinSet::new();
        let mut pending: HashMap<Id, InFlight> = HashMap::new();
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately.
        sweep.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, closing event source");
                    break;
                }
                next = events.next() => match next {
                    Some(Ok(received)) => {
                        report.received += 1;
                        self.spawn_dispatch(received, &mut in_flight, &mut pending, &mut report)
                            .await;
                    }
                    Some(Err(e)) => {
                        report.received += 1;
                        report.malformed += 1;
                        tracing::debug!(error = %e, "skipped malformed event");
                    }
                    None => {
                        tracing::info!("event stream ended");
                        break;
                    }
                },
                Some(joined) = in_flight.join_next_with_id(), if !in_flight.is_empty() => {
                    self.settle(joined, &mut pending, &mut report).await;
                }
                _ = sweep.tick() => self.sweep().await,
            }
        }

        if let Err(e) = events.close().await {
            tracing::warn!(error = %e, "failed to close event source");
        }
        self.requeue_buffered(&mut events, &mut report).await;
        self.drain(&mut in_flight, &mut pending, &mut report).await;

        tracing::info!(
            received = report.received,
            dispatched = report.dispatched,
            deduplicated = report.deduplicated,
            filtered_out = report.filtered_out,
            malformed = report.malformed,
            aborted = report.aborted,
            requeued = report.requeued,
            "pipeline stopped"
        );
        report
    }

    async fn spawn_dispatch(
        &self,
        received: ReceivedEvent,
        in_flight: &mut JoinSet<DispatchOutcome>,
        pending: &mut HashMap<Id, InFlight>,
        report: &mut PipelineReport,
    ) {
        let ReceivedEvent { event, settlement } = received;
        if !self.dispatcher.filter().is_notifiable(&event) {
            report.filtered_out += 1;
            tracing::debug!(
                job_name = %event.job_name,
                run_id = %event.run_id,
                state = %event.state,
                "event not notifiable"
            );
            ack(&settlement).await;
            return;
        }

        let key = DedupeKey::derive(&event.job_name, &event.run_id);
        let claim = ClaimTracker::default();
        let dispatcher = self.dispatcher.clone();
        let task_claim = claim.clone();
        let task = in_flight
            .spawn(async move { dispatcher.dispatch_tracked(&event, &task_claim).await });
        pending.insert(
            task.id(),
            InFlight {
                key,
                claim,
                settlement,
            },
        );
    }

    /// Record a finished dispatch and settle its bus message.
    async fn settle(
        &self,
        joined: Result<(Id, DispatchOutcome), JoinError>,
        pending: &mut HashMap<Id, InFlight>,
        report: &mut PipelineReport,
    ) {
        let (id, joined) = match joined {
            Ok((id, outcome)) => (id, Ok(outcome)),
            Err(e) => (e.id(), Err(e)),
        };
        let redeliver_after = match &joined {
            Ok(Ok(_)) => None,
            Err(e) if e.is_cancelled() => Some(Duration::ZERO),
            Ok(Err(_)) | Err(_) => Some(REDELIVERY_DELAY),
        };
        let task_died = joined.is_err();
        report.record(joined);

        let Some(InFlight {
            key,
            claim,
            settlement,
        }) = pending.remove(&id)
        else {
            return;
        };

        if task_died && claim.is_held() {
            match self.dispatcher.dedup().release(key.as_str()).await {
                Ok(()) => {
                    tracing::info!(dedupe_key = %key, "released claim of unfinished dispatch");
                }
                Err(e) => tracing::warn!(dedupe_key = %key, error = %e, "failed to release claim"),
            }
        }

        match redeliver_after {
            None => ack(&settlement).await,
            Some(delay) => {
                report.requeued += 1;
                if let Err(e) = settlement.nak(Some(delay)).await {
                    tracing::warn!(
                        message_id = %settlement.message_id(),
                        error = %e,
                        "failed to nak job event"
                    );
                }
            }
        }
    }

    /// Hand back every event that was buffered but never dispatched. The
    /// stream ends once the closed subscription stops feeding it.
    async fn requeue_buffered(&self, events: &mut EventStream, report: &mut PipelineReport) {
        let requeue = async {
            while let Some(next) = events.next().await {
                let Ok(received) = next else { continue };
                report.requeued += 1;
                if let Err(e) = received.settlement.nak(None).await {
                    tracing::warn!(error = %e, "failed to nak buffered job event");
                }
            }
        };
        if tokio::time::timeout(self.grace_period, requeue).await.is_err() {
            tracing::warn!("event stream did not end within the grace period");
        }
    }

    async fn drain(
        &self,
        in_flight: &mut JoinSet<DispatchOutcome>,
        pending: &mut HashMap<Id, InFlight>,
        report: &mut PipelineReport,
    ) {
        if in_flight.is_empty() {
            return;
        }
        tracing::info!(
            in_flight = in_flight.len(),
            grace_ms = u64::try_from(self.grace_period.as_millis()).unwrap_or(u64::MAX),
            "draining in-flight dispatches"
        );

        let deadline = tokio::time::sleep(self.grace_period);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                joined = in_flight.join_next_with_id() => match joined {
                    Some(joined) => self.settle(joined, pending, report).await,
                    None => return,
                },
                () = &mut deadline => {
                    tracing::warn!(
                        remaining = in_flight.len(),
                        "grace period elapsed, aborting in-flight dispatches"
                    );
                    in_flight.abort_all();
                    while let Some(joined) = in_flight.join_next_with_id().await {
                        self.settle(joined, pending, report).await;
                    }
                    return;
                }
            }
        }
    }

    async fn sweep(&self) {
        match self.dispatcher.dedup().purge_expired().await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "purged expired dedup entries"),
            Err(e) => tracing::warn!(error = %e, "dedup sweep failed"),
        }
    }
}

async fn ack(settlement: &Settlement) {
    if let Err(e) = settlement.ack().await {
        tracing::warn!(
            message_id = %settlement.message_id(),
            error = %e,
            "failed to ack job event"
        );
    }
}
