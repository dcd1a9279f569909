//! Backend seam between the rotation service and whatever holds the
//! registry and bandit state (in-process engine or a shared store).

use crate::error::RotatorResult;
use crate::types::ScopeKey;
use async_trait::async_trait;

/// Registry plus banner selection. Implementations must be safe to share
/// across concurrent request handlers.
#[async_trait]
pub trait BannerStorage: Send + Sync {
    async fn create_banner(&self, description: &str) -> RotatorResult<String>;
    async fn delete_banner(&self, id: &str) -> RotatorResult<()>;

    async fn create_slot(&self, description: &str) -> RotatorResult<String>;
    async fn delete_slot(&self, id: &str) -> RotatorResult<()>;

    async fn create_social_group(&self, description: &str) -> RotatorResult<String>;
    async fn delete_social_group(&self, id: &str) -> RotatorResult<()>;

    /// Add a banner to a slot's roster. `NotFound` if either side is missing.
    async fn attach_banner(&self, slot_id: &str, banner_id: &str) -> RotatorResult<()>;

    /// Remove a banner from a slot's roster. `NotAttached` if it was not on it.
    async fn detach_banner(&self, slot_id: &str, banner_id: &str) -> RotatorResult<()>;

    /// Choose a banner for the scope, seeding it from the slot roster on
    /// first use. `EmptyCandidates` when the scope has nothing to show.
    async fn select_banner(&self, scope: &ScopeKey) -> RotatorResult<String>;

    /// Record a click. `NotAttached` if the banner is not on the slot roster.
    async fn click_banner(&self, scope: &ScopeKey, banner_id: &str) -> RotatorResult<()>;
}
