//! Bus subjects used by jobwatch.

pub mod events {
    /// Default subject the job runner's lifecycle events arrive on.
    pub const JOB_STATE_CHANGE: &str = "jobwatch.events.job-state-change";
}

pub mod queues {
    /// Subject backing the named notification queue.
    #[must_use]
    pub fn named(queue: &str) -> String {
        format!("jobwatch.queues.{queue}")
    }
}
