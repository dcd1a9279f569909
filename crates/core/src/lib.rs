#![warn(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod event_bus;
pub mod ids;
pub mod storage;
pub mod types;

pub use config::AppConfig;
pub use error::{EntityKind, ErrorClass, RotatorError, RotatorResult};
pub use event_bus::EventSink;
pub use ids::{IdGenerator, UuidGenerator};
pub use storage::BannerStorage;
pub use types::{Event, EventType, ScopeKey};
