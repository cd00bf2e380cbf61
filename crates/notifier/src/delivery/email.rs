use async_trait::async_trait;
use jobwatch_domain::{NotificationPayload, Subscriber};
use serde::Serialize;

use super::Channel;
use super::http::post_json;
use crate::error::DeliveryError;

#[derive(Serialize)]
struct RelayMail<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Hands mail to an HTTP relay as `{to, subject, text}` JSON.
pub struct HttpMailRelay {
    client: reqwest::Client,
    url: String,
    from: Option<String>,
}

impl HttpMailRelay {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            from: None,
        }
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

#[async_trait]
impl Channel for HttpMailRelay {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        let mail = RelayMail {
            from: self.from.as_deref(),
            to: &subscriber.endpoint,
            subject: payload.subject(),
            text: payload.body(),
        };
        post_json(&self.client, &self.url, &mail).await?;
        tracing::debug!(to = %subscriber.endpoint, "mail handed to relay");
        Ok(())
    }
}

/// Writes the mail to the log. Used when no relay is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Channel for LogMailer {
    async fn deliver(
        &self,
        subscriber: &Subscriber,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        tracing::info!(
            to = %subscriber.endpoint,
            subject = payload.subject(),
            body = payload.body(),
            "email notification"
        );
        Ok(())
    }
}
