use std::collections::BTreeSet;

use jobwatch_domain::{JobEvent, JobState};

/// Decides which job events are worth a notification.
///
/// Every configured constraint must hold. Pure and total over all states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPolicy {
    notifiable_states: BTreeSet<JobState>,
    job_name_prefix: Option<String>,
    run_id_suffix: Option<String>,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::for_states([JobState::Failed])
    }
}

impl FilterPolicy {
    pub fn for_states(states: impl IntoIterator<Item = JobState>) -> Self {
        Self {
            notifiable_states: states.into_iter().collect(),
            job_name_prefix: None,
            run_id_suffix: None,
        }
    }

    /// Only notify jobs whose name starts with `prefix`.
    #[must_use]
    pub fn with_job_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.job_name_prefix = Some(prefix.into());
        self
    }

    /// Only notify runs whose id ends with `suffix`, e.g. the final attempt.
    #[must_use]
    pub fn with_run_id_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.run_id_suffix = Some(suffix.into());
        self
    }

    pub fn notifiable_states(&self) -> impl Iterator<Item = JobState> + '_ {
        self.notifiable_states.iter().copied()
    }

    pub fn is_notifiable(&self, event: &JobEvent) -> bool {
        self.notifiable_states.contains(&event.state)
            && self
                .job_name_prefix
                .as_deref()
                .is_none_or(|prefix| event.job_name.as_str().starts_with(prefix))
            && self
                .run_id_suffix
                .as_deref()
                .is_none_or(|suffix| event.run_id.as_str().ends_with(suffix))
    }
}
