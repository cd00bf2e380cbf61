//! TOML configuration for the notifier.
//!
//! Every section is optional except `[[topics]]`. Durations are integer
//! fields with a unit suffix and are exposed as [`Duration`] accessors.

use std::path::Path;
use std::time::Duration;

use jobwatch_dedup::DedupConfig;
use jobwatch_domain::{JobState, subjects};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::filter::FilterPolicy;
use crate::registry::TopicConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub dedup: DedupSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub source: SourceSection,
    #[serde(default)]
    pub shutdown: ShutdownSection,
    #[serde(default)]
    pub email: EmailSection,
    /// Topic the pipeline fans out to. Defaults to the first topic.
    #[serde(default)]
    pub dispatch_topic: Option<String>,
    pub topics: Vec<TopicConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterSection {
    pub notifiable_states: Vec<JobState>,
    pub job_name_prefix: Option<String>,
    pub run_id_suffix: Option<String>,
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            notifiable_states: vec![JobState::Failed],
            job_name_prefix: None,
            run_id_suffix: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupSection {
    pub retention_secs: u64,
    pub max_entries: usize,
    pub shards: usize,
    /// Switches to the Redis-backed store when set.
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub sweep_interval_secs: u64,
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 60 * 60,
            max_entries: 100_000,
            shards: 16,
            redis_url: None,
            redis_key_prefix: "jobwatch:dedup:".to_string(),
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt_timeout_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            attempt_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSection {
    pub subject: String,
    pub group: String,
    /// Decoded events buffered between the bus handler and the pipeline.
    pub buffer: usize,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            subject: subjects::events::JOB_STATE_CHANGE.to_string(),
            group: "jobwatch".to_string(),
            buffer: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShutdownSection {
    pub grace_period_secs: u64,
}

impl Default for ShutdownSection {
    fn default() -> Self {
        Self {
            grace_period_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailSection {
    /// HTTP mail relay. Mail is only logged when unset.
    pub relay_url: Option<String>,
    pub from: Option<String>,
}

impl NotifierConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Checks that need more than one field. Topic and subscriber shape is
    /// checked by the registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filter.notifiable_states.is_empty() {
            return Err(ConfigError::Invalid(
                "filter.notifiable_states must name at least one state".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".into()));
        }
        if self.retry.attempt_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry.attempt_timeout_ms must be > 0".into(),
            ));
        }
        if self.dedup.retention_secs == 0 || self.dedup.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "dedup.retention_secs and dedup.max_entries must be > 0".into(),
            ));
        }
        if let Some(topic) = &self.dispatch_topic
            && !self.topics.iter().any(|t| t.name.trim() == topic)
        {
            return Err(ConfigError::Invalid(format!(
                "dispatch_topic {topic:?} is not a configured topic"
            )));
        }
        Ok(())
    }

    /// `dispatch_topic`, or the first configured topic.
    pub fn dispatch_topic(&self) -> Option<&str> {
        self.dispatch_topic
            .as_deref()
            .or_else(|| self.topics.first().map(|t| t.name.trim()))
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        let mut policy = FilterPolicy::for_states(self.filter.notifiable_states.iter().copied());
        if let Some(prefix) = &self.filter.job_name_prefix {
            policy = policy.with_job_name_prefix(prefix.clone());
        }
        if let Some(suffix) = &self.filter.run_id_suffix {
            policy = policy.with_run_id_suffix(suffix.clone());
        }
        policy
    }

    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig {
            retention: Duration::from_secs(self.dedup.retention_secs),
            max_entries: self.dedup.max_entries,
            shards: self.dedup.shards,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            attempt_timeout: Duration::from_millis(self.retry.attempt_timeout_ms),
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_period_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.dedup.sweep_interval_secs.max(1))
    }
}
