//! Store-backed banner rotation. Bandit state for every (slot, social group)
//! scope lives in a shared store that only offers atomic primitives, so any
//! number of stateless replicas can learn together.

#![warn(clippy::unwrap_used)]

pub mod backend;
pub mod error;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod selector;

pub use backend::AtomicStore;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use selector::StoreSelector;
