mod clock;
mod error;
mod memory;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DedupError;
pub use memory::MemoryDedupStore;
pub use store::{Claim, DedupConfig, DedupState, DedupStore};
