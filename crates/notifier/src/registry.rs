use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use jobwatch_domain::Subscriber;
use serde::Deserialize;

use crate::error::RegistryLoadError;

/// Topic as written in config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopicConfig {
    pub name: String,
    #[serde(default)]
    pub subscribers: Vec<Subscriber>,
}

/// A validated topic. Subscriber order is preserved from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    name: String,
    subscribers: Vec<Subscriber>,
}

impl Topic {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribers(&self) -> &[Subscriber] {
        &self.subscribers
    }

    pub fn active_subscribers(&self) -> impl Iterator<Item = &Subscriber> {
        self.subscribers.iter().filter(|s| s.active)
    }
}

/// Immutable view of the whole registry at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    version: u64,
    topics: Vec<Topic>,
}

impl RegistrySnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    fn build(version: u64, configs: &[TopicConfig]) -> Result<Self, RegistryLoadError> {
        if configs.is_empty() {
            return Err(RegistryLoadError::Empty);
        }

        let mut seen = HashSet::with_capacity(configs.len());
        let mut topics = Vec::with_capacity(configs.len());
        for config in configs {
            let name = config.name.trim();
            if name.is_empty() {
                return Err(RegistryLoadError::EmptyTopicName);
            }
            if !seen.insert(name) {
                return Err(RegistryLoadError::DuplicateTopic(name.to_string()));
            }
            for subscriber in &config.subscribers {
                subscriber
                    .validate()
                    .map_err(|source| RegistryLoadError::InvalidSubscriber {
                        topic: name.to_string(),
                        source,
                    })?;
            }
            topics.push(Topic {
                name: name.to_string(),
                subscribers: config.subscribers.clone(),
            });
        }

        Ok(Self { version, topics })
    }
}

/// Topic → subscribers mapping, replaced as a whole on reload.
///
/// Readers take a [`snapshot`](Self::snapshot) and keep it for the whole
/// dispatch cycle, so a reload never changes the subscriber set mid-fan-out.
pub struct SubscriberRegistry {
    current: ArcSwap<RegistrySnapshot>,
}

impl SubscriberRegistry {
    /// Build the initial registry (version 1).
    pub fn load(configs: &[TopicConfig]) -> Result<Self, RegistryLoadError> {
        let snapshot = RegistrySnapshot::build(1, configs)?;
        tracing::info!(
            version = snapshot.version,
            topics = snapshot.topics.len(),
            "subscriber registry loaded"
        );
        Ok(Self {
            current: ArcSwap::from_pointee(snapshot),
        })
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }

    /// Subscribers of `topic` in configured order, inactive ones included.
    pub fn subscribers_of(&self, topic: &str) -> Result<Vec<Subscriber>, RegistryLoadError> {
        self.current
            .load()
            .topic(topic)
            .map(|t| t.subscribers.clone())
            .ok_or_else(|| RegistryLoadError::UnknownTopic(topic.to_string()))
    }

    /// Validate `configs` and swap them in as the next version. On error
    /// the current snapshot stays in place.
    pub fn reload(&self, configs: &[TopicConfig]) -> Result<u64, RegistryLoadError> {
        let validated = RegistrySnapshot::build(0, configs).inspect_err(|e| {
            tracing::warn!(
                error = %e,
                version = self.version(),
                "registry reload rejected, keeping current registry"
            );
        })?;

        let previous = self.current.rcu(|current| RegistrySnapshot {
            version: current.version + 1,
            topics: validated.topics.clone(),
        });
        let version = previous.version + 1;
        tracing::info!(version, topics = validated.topics.len(), "subscriber registry reloaded");
        Ok(version)
    }
}
