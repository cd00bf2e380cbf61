mod error;
mod store;

pub use store::{RedisDedupConfig, RedisDedupStore};
