//! Durable store for hits that could not be delivered.

pub mod hit;
pub mod storage;

pub use hit::Hit;
pub use storage::{Storage, StorageError, MAX_RETRY_COUNT};
