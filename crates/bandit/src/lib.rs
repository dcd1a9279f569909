//! UCB1 multi-armed bandit for banner rotation: the score function, the
//! in-process mutex-guarded selector and the per-scope engine over it.

#![warn(clippy::unwrap_used)]

pub mod engine;
pub mod local;
pub mod score;
pub mod selector;

pub use engine::BanditEngine;
pub use local::LocalStorage;
pub use score::ucb1_score;
pub use selector::{ArmStats, Selector, Ucb1Selector};
