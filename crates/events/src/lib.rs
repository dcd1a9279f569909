//! Select and click events leave the process through a bounded queue and a
//! background drain task, so a slow or missing broker never stalls a
//! request.

#![warn(clippy::unwrap_used)]

pub mod publisher;
pub mod queue;

pub use publisher::EventPublisher;
pub use queue::{EventQueue, NatsQueue};
