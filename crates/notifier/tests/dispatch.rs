//! Dispatcher behavior against scripted channels and a real HTTP endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    PanickingChannel, RecordingChannel, UnreachableDedup, dispatcher, event, memory_dedup,
};
use jobwatch_dedup::{DedupConfig, DedupState, DedupStore, ManualClock, MemoryDedupStore};
use jobwatch_domain::{DedupeKey, JobName, JobState, RunId, Subscriber};
use jobwatch_notifier::{
    Channels, DeliveryError, DispatchReport, DispatchResult, NotifierError, TopicConfig,
    WebhookChannel,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn expect_dispatched(result: DispatchResult) -> DispatchReport {
    match result {
        DispatchResult::Dispatched(report) => report,
        other => panic!("expected Dispatched, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_event_reaches_every_subscriber() {
    let channel = RecordingChannel::new();
    let subscribers = vec![
        Subscriber::email("a@example.com"),
        Subscriber::email("b@example.com"),
    ];
    let dispatcher = dispatcher(
        subscribers.clone(),
        Channels::uniform(channel.clone()),
        memory_dedup(),
    );

    let report = expect_dispatched(
        dispatcher
            .dispatch(&event("etl-1", "r1", JobState::Failed))
            .await
            .unwrap(),
    );

    assert_eq!(report.delivered, subscribers);
    assert!(report.failed.is_empty());
    assert!(report.is_complete());
    assert_eq!(report.topic, "job-failures");
    assert_eq!(channel.attempts().len(), 2);
    assert_eq!(
        dispatcher
            .dedup()
            .state(report.dedupe_key.as_str())
            .await
            .unwrap(),
        Some(DedupState::Completed)
    );
}

#[tokio::test]
async fn redelivered_event_is_deduplicated() {
    let channel = RecordingChannel::new();
    let dispatcher = dispatcher(
        vec![
            Subscriber::email("a@example.com"),
            Subscriber::email("b@example.com"),
        ],
        Channels::uniform(channel.clone()),
        memory_dedup(),
    );
    let failed = event("etl-1", "r1", JobState::Failed);

    let first = expect_dispatched(dispatcher.dispatch(&failed).await.unwrap());
    let second = dispatcher.dispatch(&failed).await.unwrap();

    assert_eq!(
        second,
        DispatchResult::Deduplicated {
            dedupe_key: first.dedupe_key,
            state: DedupState::Completed,
        }
    );
    assert_eq!(channel.attempts().len(), 2);
}

#[tokio::test]
async fn other_run_of_same_job_is_not_deduplicated() {
    let channel = RecordingChannel::new();
    let dispatcher = dispatcher(
        vec![Subscriber::email("a@example.com")],
        Channels::uniform(channel.clone()),
        memory_dedup(),
    );

    dispatcher
        .dispatch(&event("etl-1", "r1", JobState::Failed))
        .await
        .unwrap();
    let retry_run = dispatcher
        .dispatch(&event("etl-1", "r2", JobState::Failed))
        .await
        .unwrap();

    assert!(matches!(retry_run, DispatchResult::Dispatched(_)));
    assert_eq!(channel.attempts().len(), 2);
}

#[tokio::test]
async fn non_notifiable_event_is_rejected_without_contact() {
    let channel = RecordingChannel::new();
    let dedup = memory_dedup();
    let dispatcher = dispatcher(
        vec![Subscriber::email("a@example.com")],
        Channels::uniform(channel.clone()),
        dedup.clone(),
    );

    for state in [
        JobState::Starting,
        JobState::Running,
        JobState::Succeeded,
        JobState::Stopped,
        JobState::Timeout,
    ] {
        let result = dispatcher
            .dispatch(&event("etl-2", "r1", state))
            .await
            .unwrap();
        assert!(matches!(result, DispatchResult::Rejected { .. }), "{state}");
    }

    assert!(channel.attempts().is_empty());
    let key = DedupeKey::derive(
        &JobName::new("etl-2").unwrap(),
        &RunId::new("r1").unwrap(),
    );
    assert_eq!(dedup.state(key.as_str()).await.unwrap(), None);
}

#[tokio::test]
async fn webhook_outage_does_not_block_email() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let email = RecordingChannel::new();
    let channels = Channels::new(
        email.clone(),
        Arc::new(WebhookChannel::new(reqwest::Client::new())),
        email.clone(),
    );
    let webhook_x = Subscriber::webhook(format!("{}/hooks/x", server.uri()));
    let email_a = Subscriber::email("a@example.com");
    let dispatcher = dispatcher(
        vec![email_a.clone(), webhook_x.clone()],
        channels,
        memory_dedup(),
    );

    let report = expect_dispatched(
        dispatcher
            .dispatch(&event("etl-1", "r1", JobState::Failed))
            .await
            .unwrap(),
    );

    assert_eq!(report.delivered, vec![email_a]);
    assert_eq!(report.failed.len(), 1);
    let failure = &report.failed[0];
    assert_eq!(failure.subscriber, webhook_x);
    assert!(matches!(failure.error, DeliveryError::Transient(_)));
    assert_eq!(failure.attempts, 3);
    assert_eq!(
        dispatcher
            .dedup()
            .state(report.dedupe_key.as_str())
            .await
            .unwrap(),
        Some(DedupState::PartiallyFailed)
    );
}

#[tokio::test]
async fn permanent_failure_is_isolated_and_not_retried() {
    let channel = RecordingChannel::new();
    channel.fail(
        "gone@example.com",
        DeliveryError::Permanent("mailbox does not exist".into()),
    );
    let dispatcher = dispatcher(
        vec![
            Subscriber::email("gone@example.com"),
            Subscriber::email("b@example.com"),
        ],
        Channels::uniform(channel.clone()),
        memory_dedup(),
    );

    let report = expect_dispatched(
        dispatcher
            .dispatch(&event("etl-1", "r1", JobState::Failed))
            .await
            .unwrap(),
    );

    assert_eq!(report.delivered, vec![Subscriber::email("b@example.com")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].attempts, 1);
    assert_eq!(channel.attempts_for("gone@example.com"), 1);
}

#[tokio::test]
async fn panicking_delivery_is_reported_as_failed() {
    let channel = Arc::new(PanickingChannel {
        endpoint: "boom@example.com".into(),
    });
    let dispatcher = dispatcher(
        vec![
            Subscriber::email("boom@example.com"),
            Subscriber::email("b@example.com"),
        ],
        Channels::uniform(channel),
        memory_dedup(),
    );

    let report = expect_dispatched(
        dispatcher
            .dispatch(&event("etl-1", "r1", JobState::Failed))
            .await
            .unwrap(),
    );

    assert_eq!(report.delivered, vec![Subscriber::email("b@example.com")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].subscriber, Subscriber::email("boom@example.com"));
    assert!(matches!(report.failed[0].error, DeliveryError::Permanent(_)));
    assert_eq!(
        dispatcher
            .dedup()
            .state(report.dedupe_key.as_str())
            .await
            .unwrap(),
        Some(DedupState::PartiallyFailed)
    );
}

#[tokio::test]
async fn inactive_subscribers_are_skipped() {
    let channel = RecordingChannel::new();
    let dispatcher = dispatcher(
        vec![
            Subscriber::email("a@example.com"),
            Subscriber::queue("ops-alerts").inactive(),
        ],
        Channels::uniform(channel.clone()),
        memory_dedup(),
    );

    let report = expect_dispatched(
        dispatcher
            .dispatch(&event("etl-1", "r1", JobState::Failed))
            .await
            .unwrap(),
    );
    assert_eq!(report.delivered.len(), 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(channel.attempts_for("ops-alerts"), 0);
}

#[tokio::test]
async fn topic_without_subscribers_completes_empty() {
    let channel = RecordingChannel::new();
    let dispatcher = dispatcher(vec![], Channels::uniform(channel.clone()), memory_dedup());

    let report = expect_dispatched(
        dispatcher
            .dispatch(&event("etl-1", "r1", JobState::Failed))
            .await
            .unwrap(),
    );
    assert!(report.delivered.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(
        dispatcher
            .dedup()
            .state(report.dedupe_key.as_str())
            .await
            .unwrap(),
        Some(DedupState::Completed)
    );
}

#[tokio::test]
async fn dedup_outage_fails_closed() {
    let channel = RecordingChannel::new();
    let dispatcher = dispatcher(
        vec![Subscriber::email("a@example.com")],
        Channels::uniform(channel.clone()),
        Arc::new(UnreachableDedup),
    );

    let err = dispatcher
        .dispatch(&event("etl-1", "r1", JobState::Failed))
        .await
        .unwrap_err();
    assert!(matches!(err, NotifierError::Dedup(_)));
    assert!(channel.attempts().is_empty());
}

#[tokio::test]
async fn retention_expiry_allows_redispatch() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let dedup: Arc<dyn DedupStore> = Arc::new(MemoryDedupStore::with_clock(
        &DedupConfig {
            retention: Duration::from_secs(60),
            ..DedupConfig::default()
        },
        clock.clone(),
    ));
    let channel = RecordingChannel::new();
    let dispatcher = dispatcher(
        vec![Subscriber::email("a@example.com")],
        Channels::uniform(channel.clone()),
        dedup,
    );
    let failed = event("etl-1", "r1", JobState::Failed);

    dispatcher.dispatch(&failed).await.unwrap();
    clock.advance(Duration::from_secs(30));
    assert!(matches!(
        dispatcher.dispatch(&failed).await.unwrap(),
        DispatchResult::Deduplicated { .. }
    ));

    clock.advance(Duration::from_secs(31));
    assert!(matches!(
        dispatcher.dispatch(&failed).await.unwrap(),
        DispatchResult::Dispatched(_)
    ));
    assert_eq!(channel.attempts().len(), 2);
}

#[tokio::test]
async fn concurrent_duplicates_notify_once() {
    let channel = RecordingChannel::new();
    channel.stall(Duration::from_millis(50));
    let dispatcher = Arc::new(dispatcher(
        vec![Subscriber::email("a@example.com")],
        Channels::uniform(channel.clone()),
        memory_dedup(),
    ));
    let failed = event("etl-1", "r1", JobState::Failed);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let dispatcher = dispatcher.clone();
        let failed = failed.clone();
        tasks.push(tokio::spawn(async move { dispatcher.dispatch(&failed).await }));
    }

    let mut dispatched = 0;
    let mut deduplicated = 0;
    for task in tasks {
        match task.await.unwrap().unwrap() {
            DispatchResult::Dispatched(_) => dispatched += 1,
            DispatchResult::Deduplicated { .. } => deduplicated += 1,
            DispatchResult::Rejected { .. } => unreachable!(),
        }
    }
    assert_eq!(dispatched, 1);
    assert_eq!(deduplicated, 7);
    assert_eq!(channel.attempts().len(), 1);
}

#[tokio::test]
async fn reload_applies_to_next_dispatch() {
    let channel = RecordingChannel::new();
    let dispatcher = dispatcher(
        vec![Subscriber::email("a@example.com")],
        Channels::uniform(channel.clone()),
        memory_dedup(),
    );

    let version = dispatcher
        .registry()
        .reload(&[TopicConfig {
            name: "job-failures".into(),
            subscribers: vec![Subscriber::email("oncall@example.com")],
        }])
        .unwrap();

    let report = expect_dispatched(
        dispatcher
            .dispatch(&event("etl-1", "r1", JobState::Failed))
            .await
            .unwrap(),
    );
    assert_eq!(report.registry_version, version);
    assert_eq!(
        report.delivered,
        vec![Subscriber::email("oncall@example.com")]
    );
    assert_eq!(channel.attempts_for("a@example.com"), 0);
}

#[tokio::test]
async fn missing_topic_releases_claim() {
    let channel = RecordingChannel::new();
    let dispatcher = dispatcher(
        vec![Subscriber::email("a@example.com")],
        Channels::uniform(channel.clone()),
        memory_dedup(),
    );
    dispatcher
        .registry()
        .reload(&[TopicConfig {
            name: "something-else".into(),
            subscribers: vec![],
        }])
        .unwrap();

    let failed = event("etl-1", "r1", JobState::Failed);
    let err = dispatcher.dispatch(&failed).await.unwrap_err();
    assert!(matches!(err, NotifierError::UnknownTopic(_)));

    let key = DedupeKey::derive(&failed.job_name, &failed.run_id);
    assert_eq!(dispatcher.dedup().state(key.as_str()).await.unwrap(), None);
}
