use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Email,
    Webhook,
    Queue,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Webhook => "WEBHOOK",
            Self::Queue => "QUEUE",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification endpoint on a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Subscriber {
    /// Mailbox address, HTTP(S) URL, or queue name depending on `protocol`.
    pub endpoint: String,
    pub protocol: Protocol,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Subscriber {
    pub fn email(address: impl Into<String>) -> Self {
        Self::new(address, Protocol::Email)
    }

    pub fn webhook(url: impl Into<String>) -> Self {
        Self::new(url, Protocol::Webhook)
    }

    pub fn queue(name: impl Into<String>) -> Self {
        Self::new(name, Protocol::Queue)
    }

    fn new(endpoint: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            endpoint: endpoint.into(),
            protocol,
            active: true,
        }
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Shape check of the endpoint for its protocol. Reachability is only
    /// known at delivery time.
    pub fn validate(&self) -> Result<(), DomainError> {
        let endpoint = self.endpoint.trim();
        let ok = match self.protocol {
            Protocol::Email => endpoint
                .split_once('@')
                .is_some_and(|(user, host)| !user.is_empty() && !host.is_empty()),
            Protocol::Webhook => {
                endpoint.starts_with("https://") || endpoint.starts_with("http://")
            }
            Protocol::Queue => {
                !endpoint.is_empty()
                    && endpoint
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            }
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::InvalidEndpoint {
                protocol: self.protocol.to_string(),
                endpoint: self.endpoint.clone(),
            })
        }
    }
}

impl std::fmt::Display for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.protocol, self.endpoint)
    }
}
