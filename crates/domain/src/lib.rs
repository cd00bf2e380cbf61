pub mod error;
pub mod event;
pub mod ids;
pub mod notification;
pub mod state;
pub mod subjects;
pub mod subscriber;
pub mod wire;

pub use error::{DomainError, MalformedEventError};
pub use event::JobEvent;
pub use ids::{JobName, RunId};
pub use notification::{DedupeKey, NotificationPayload, WebhookBody};
pub use state::JobState;
pub use subscriber::{Protocol, Subscriber};
pub use wire::decode_event;
