use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use jobwatch_bus::Envelope;

pub(crate) type SharedStore = Arc<Mutex<SubjectStore>>;

pub(crate) struct SubjectStore {
    pub subjects: HashMap<String, SubjectLog>,
}

/// Append-only log for one subject plus the per-group delivery state.
pub(crate) struct SubjectLog {
    pub messages: Vec<Envelope>,
    /// message_id -> index in `messages`.
    pub id_index: HashMap<String, usize>,
    pub groups: HashMap<String, ConsumerGroup>,
    pub notify: Arc<Notify>,
}

pub(crate) struct ConsumerGroup {
    /// Index of the last delivered message; None starts at the beginning.
    pub cursor: Option<usize>,
    pub pending: HashSet<String>,
    pub redeliver: VecDeque<String>,
}

impl SubjectStore {
    pub fn new() -> Self {
        Self {
            subjects: HashMap::new(),
        }
    }

    pub fn log_mut(&mut self, subject: &str) -> &mut SubjectLog {
        self.subjects
            .entry(subject.to_string())
            .or_insert_with(|| SubjectLog {
                messages: Vec::new(),
                id_index: HashMap::new(),
                groups: HashMap::new(),
                notify: Arc::new(Notify::new()),
            })
    }

    /// Append and wake every consumer waiting on the subject.
    pub fn append(&mut self, envelope: Envelope) {
        let log = self.log_mut(&envelope.subject.clone());
        log.id_index
            .insert(envelope.message_id.clone(), log.messages.len());
        log.messages.push(envelope);
        log.notify.notify_waiters();
    }

    pub fn group_mut(&mut self, subject: &str, group: &str) -> Option<&mut ConsumerGroup> {
        self.subjects.get_mut(subject)?.groups.get_mut(group)
    }
}

impl ConsumerGroup {
    pub fn new(cursor: Option<usize>) -> Self {
        Self {
            cursor,
            pending: HashSet::new(),
            redeliver: VecDeque::new(),
        }
    }
}

/// Dead-letter subject for messages rejected on `subject`.
///
/// `jobwatch.events.job-state-change` → `jobwatch.deadletter.events`
pub fn dead_letter_subject(subject: &str) -> String {
    let domain = subject.split('.').nth(1).unwrap_or("unknown");
    format!("jobwatch.deadletter.{domain}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_letter_subject_uses_second_token() {
        assert_eq!(
            dead_letter_subject("jobwatch.events.job-state-change"),
            "jobwatch.deadletter.events"
        );
        assert_eq!(
            dead_letter_subject("jobwatch.queues.ops"),
            "jobwatch.deadletter.queues"
        );
        assert_eq!(dead_letter_subject("single"), "jobwatch.deadletter.unknown");
    }
}
