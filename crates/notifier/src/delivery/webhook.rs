use async_trait::async_trait;
use jobwatch_domain::{NotificationPayload, Subscriber};

use super::Channel;
use super::http::post_json;
use crate::error::DeliveryError;

/// POSTs the [`WebhookBody`](jobwatch_domain::WebhookBody) JSON to the
/// subscriber's URL.
pub struct WebhookChannel {
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        post_json(&self.client, &subscriber.endpoint, &payload.webhook_body()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use jobwatch_domain::{JobEvent, JobName, JobState, RunId};
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> NotificationPayload {
        NotificationPayload::from_event(&JobEvent::new(
            JobName::new("etl-1").unwrap(),
            RunId::new("r1").unwrap(),
            JobState::Failed,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            "test",
        ))
    }

    #[tokio::test]
    async fn posts_webhook_body() {
        let server = MockServer::start().await;
        let payload = payload();
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "jobName": "etl-1",
                "runId": "r1",
                "state": "FAILED",
                "timestamp": "2024-05-01T12:00:00Z",
                "dedupeKey": payload.dedupe_key().as_str(),
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WebhookChannel::new(reqwest::Client::new());
        channel
            .deliver(
                &Subscriber::webhook(format!("{}/hook", server.uri())),
                &payload,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = WebhookChannel::new(reqwest::Client::new())
            .deliver(&Subscriber::webhook(server.uri()), &payload())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn not_found_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = WebhookChannel::new(reqwest::Client::new())
            .deliver(&Subscriber::webhook(server.uri()), &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Permanent(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = WebhookChannel::new(reqwest::Client::new())
            .deliver(
                &Subscriber::webhook(format!("http://127.0.0.1:{port}/hook")),
                &payload(),
            )
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
