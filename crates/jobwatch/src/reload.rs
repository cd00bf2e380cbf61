use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use jobwatch_notifier::{Notifier, NotifierConfig, Pipeline, TopicConfig};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Re-read the config file every `every` and swap in the topics when they
/// changed. Other sections need a restart.
pub async fn watch(
    path: PathBuf,
    every: Duration,
    notifier: Arc<Notifier>,
    applied: Vec<TopicConfig>,
    shutdown: CancellationToken,
) {
    let mut topics = TopicWatch::new(applied);
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match NotifierConfig::load(&path) {
            Ok(fresh) => {
                topics.offer(notifier.pipeline(), fresh.topics);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "config reload skipped");
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Reload {
    Unchanged,
    Applied(u64),
    Rejected,
}

/// Remembers the topics in force and the last rejected set, so a bad file
/// is reported once rather than on every tick.
struct TopicWatch {
    applied: Vec<TopicConfig>,
    rejected: Option<Vec<TopicConfig>>,
}

impl TopicWatch {
    fn new(applied: Vec<TopicConfig>) -> Self {
        Self {
            applied,
            rejected: None,
        }
    }

    fn offer(&mut self, pipeline: &Pipeline, topics: Vec<TopicConfig>) -> Reload {
        if topics == self.applied || self.rejected.as_ref() == Some(&topics) {
            return Reload::Unchanged;
        }

        match pipeline.reload_registry(&topics) {
            Ok(version) => {
                tracing::info!(version, topics = topics.len(), "subscriber registry reloaded");
                self.applied = topics;
                self.rejected = None;
                Reload::Applied(version)
            }
            Err(e) => {
                tracing::warn!(error = %e, "reload rejected, keeping the running registry");
                self.rejected = Some(topics);
                Reload::Rejected
            }
        }
    }
}
