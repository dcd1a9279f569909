//! Application service in front of the banner storage: input validation,
//! error logging with operation context, and select/click event emission.

#![warn(clippy::unwrap_used)]

use rotator_core::error::{ErrorClass, RotatorError, RotatorResult};
use rotator_core::event_bus::EventSink;
use rotator_core::storage::BannerStorage;
use rotator_core::types::{Event, EventType, ScopeKey};
use std::sync::Arc;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct Rotator {
    storage: Arc<dyn BannerStorage>,
    events: Arc<dyn EventSink>,
}

fn require_non_empty(field: &str, value: &str) -> RotatorResult<()> {
    if value.trim().is_empty() {
        Err(RotatorError::Validation(format!("{field} is empty")))
    } else {
        Ok(())
    }
}

/// Log a failed operation with its inputs and tag opaque failures with the
/// operation name. The error class is left as it was.
fn traced<T>(op: &'static str, subject: &str, result: RotatorResult<T>) -> RotatorResult<T> {
    result.map_err(|e| {
        let e = e.context(op);
        match e.class() {
            ErrorClass::Internal => error!(op, subject, error = %e, "Rotator operation failed"),
            _ => debug!(op, subject, error = %e, "Rotator operation rejected"),
        }
        e
    })
}

impl Rotator {
    pub fn new(storage: Arc<dyn BannerStorage>, events: Arc<dyn EventSink>) -> Self {
        Self { storage, events }
    }

    pub async fn create_banner(&self, description: &str) -> RotatorResult<String> {
        require_non_empty("description", description)?;
        traced(
            "create_banner",
            description,
            self.storage.create_banner(description).await,
        )
    }

    pub async fn delete_banner(&self, id: &str) -> RotatorResult<()> {
        require_non_empty("banner id", id)?;
        traced("delete_banner", id, self.storage.delete_banner(id).await)
    }

    pub async fn create_slot(&self, description: &str) -> RotatorResult<String> {
        require_non_empty("description", description)?;
        traced(
            "create_slot",
            description,
            self.storage.create_slot(description).await,
        )
    }

    pub async fn delete_slot(&self, id: &str) -> RotatorResult<()> {
        require_non_empty("slot id", id)?;
        traced("delete_slot", id, self.storage.delete_slot(id).await)
    }

    pub async fn create_social_group(&self, description: &str) -> RotatorResult<String> {
        require_non_empty("description", description)?;
        traced(
            "create_social_group",
            description,
            self.storage.create_social_group(description).await,
        )
    }

    pub async fn delete_social_group(&self, id: &str) -> RotatorResult<()> {
        require_non_empty("social group id", id)?;
        traced(
            "delete_social_group",
            id,
            self.storage.delete_social_group(id).await,
        )
    }

    pub async fn attach_banner(&self, slot_id: &str, banner_id: &str) -> RotatorResult<()> {
        require_non_empty("slot id", slot_id)?;
        require_non_empty("banner id", banner_id)?;
        traced(
            "attach_banner",
            slot_id,
            self.storage.attach_banner(slot_id, banner_id).await,
        )
    }

    pub async fn detach_banner(&self, slot_id: &str, banner_id: &str) -> RotatorResult<()> {
        require_non_empty("slot id", slot_id)?;
        require_non_empty("banner id", banner_id)?;
        traced(
            "detach_banner",
            slot_id,
            self.storage.detach_banner(slot_id, banner_id).await,
        )
    }

    /// Pick a banner for `slot_id` as seen by `social_group_id` and report
    /// the impression.
    pub async fn select_banner(&self, slot_id: &str, social_group_id: &str) -> RotatorResult<String> {
        require_non_empty("slot id", slot_id)?;
        require_non_empty("social group id", social_group_id)?;
        let scope = ScopeKey::new(slot_id, social_group_id);
        let subject = scope.to_string();

        let banner_id = traced(
            "select_banner",
            &subject,
            self.storage.select_banner(&scope).await,
        )?;
        self.emit(Event::now(EventType::Select, &scope, banner_id.as_str()));
        Ok(banner_id)
    }

    pub async fn click_banner(
        &self,
        slot_id: &str,
        banner_id: &str,
        social_group_id: &str,
    ) -> RotatorResult<()> {
        require_non_empty("slot id", slot_id)?;
        require_non_empty("banner id", banner_id)?;
        require_non_empty("social group id", social_group_id)?;
        let scope = ScopeKey::new(slot_id, social_group_id);
        let subject = scope.to_string();

        traced(
            "click_banner",
            &subject,
            self.storage.click_banner(&scope, banner_id).await,
        )?;
        self.emit(Event::now(EventType::Click, &scope, banner_id));
        Ok(())
    }

    // The state change already happened; a lost event is not worth failing
    // the request over.
    fn emit(&self, event: Event) {
        let event_type = event.event_type;
        if let Err(e) = self.events.emit(event) {
            warn!(?event_type, error = %e, "Failed to emit rotation event");
        }
    }
}
