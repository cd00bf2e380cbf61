#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jobwatch_dedup::{Claim, DedupConfig, DedupError, DedupState, DedupStore, MemoryDedupStore};
use jobwatch_domain::{
    DedupeKey, JobEvent, JobName, JobState, NotificationPayload, RunId, Subscriber,
};
use jobwatch_notifier::{
    Channel, Channels, DeliveryError, Dispatcher, FilterPolicy, RetryPolicy, SubscriberRegistry,
    TopicConfig,
};

pub const TOPIC: &str = "job-failures";

pub fn event(job: &str, run: &str, state: JobState) -> JobEvent {
    JobEvent::new(
        JobName::new(job).unwrap(),
        RunId::new(run).unwrap(),
        state,
        Utc::now(),
        "test",
    )
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        attempt_timeout: Duration::from_secs(2),
    }
}

pub fn registry(subscribers: Vec<Subscriber>) -> Arc<SubscriberRegistry> {
    Arc::new(
        SubscriberRegistry::load(&[TopicConfig {
            name: TOPIC.to_string(),
            subscribers,
        }])
        .unwrap(),
    )
}

pub fn memory_dedup() -> Arc<dyn DedupStore> {
    Arc::new(MemoryDedupStore::new(&DedupConfig::default()))
}

pub fn dispatcher(
    subscribers: Vec<Subscriber>,
    channels: Channels,
    dedup: Arc<dyn DedupStore>,
) -> Dispatcher {
    Dispatcher::new(
        TOPIC,
        Arc::new(FilterPolicy::default()),
        registry(subscribers),
        dedup,
        channels,
        fast_retry(),
    )
}

/// Records every attempt; endpoints can be scripted to fail or stall.
#[derive(Default)]
pub struct RecordingChannel {
    attempts: Mutex<Vec<(Subscriber, DedupeKey)>>,
    failures: Mutex<HashMap<String, DeliveryError>>,
    delay: Mutex<Option<Duration>>,
    run_delays: Mutex<HashMap<String, Duration>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, endpoint: &str, error: DeliveryError) {
        self.failures
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), error);
    }

    pub fn stall(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Stall only deliveries for `run_id`.
    pub fn stall_run(&self, run_id: &str, delay: Duration) {
        self.run_delays
            .lock()
            .unwrap()
            .insert(run_id.to_string(), delay);
    }

    pub fn attempts(&self) -> Vec<(Subscriber, DedupeKey)> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, endpoint: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s.endpoint == endpoint)
            .count()
    }

    /// Poll until at least `n` attempts have been made. Panics after 5s.
    pub async fn wait_for_attempts(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.attempts.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for delivery attempts");
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        self.attempts
            .lock()
            .unwrap()
            .push((subscriber.clone(), payload.dedupe_key().clone()));

        let run_delay = self
            .run_delays
            .lock()
            .unwrap()
            .get(payload.event().run_id.as_str())
            .copied();
        let delay = run_delay.or(*self.delay.lock().unwrap());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get(&subscriber.endpoint)
            .cloned();
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Panics when asked to deliver to `endpoint`, succeeds otherwise.
pub struct PanickingChannel {
    pub endpoint: String,
}

#[async_trait]
impl Channel for PanickingChannel {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        _payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        if subscriber.endpoint == self.endpoint {
            panic!("mail client crashed for {}", subscriber.endpoint);
        }
        Ok(())
    }
}

/// A dedup store whose backend is down.
pub struct UnreachableDedup;

#[async_trait]
impl DedupStore for UnreachableDedup {
    async fn try_claim(&self, _key: &str) -> Result<Claim, DedupError> {
        Err(DedupError::Connection("connection refused".into()))
    }

    async fn finish(&self, _key: &str, _state: DedupState) -> Result<(), DedupError> {
        Err(DedupError::Connection("connection refused".into()))
    }

    async fn release(&self, _key: &str) -> Result<(), DedupError> {
        Err(DedupError::Connection("connection refused".into()))
    }

    async fn state(&self, _key: &str) -> Result<Option<DedupState>, DedupError> {
        Err(DedupError::Connection("connection refused".into()))
    }

    async fn ping(&self) -> Result<bool, DedupError> {
        Ok(false)
    }
}
