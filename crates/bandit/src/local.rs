//! In-process backend: registry in concurrent maps, one `Ucb1Selector` per
//! (slot, social group) scope. State lives only as long as the process and
//! is not shared between replicas.

use crate::engine::BanditEngine;
use crate::selector::{Selector, Ucb1Selector};
use async_trait::async_trait;
use dashmap::DashMap;
use rotator_core::error::{EntityKind, RotatorError, RotatorResult};
use rotator_core::ids::{IdGenerator, UuidGenerator};
use rotator_core::storage::BannerStorage;
use rotator_core::types::ScopeKey;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

pub struct LocalStorage {
    banners: DashMap<String, String>,
    slots: DashMap<String, String>,
    social_groups: DashMap<String, String>,
    rosters: DashMap<String, BTreeSet<String>>,
    engine: BanditEngine,
    ids: Arc<dyn IdGenerator>,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self::with_id_generator(Arc::new(UuidGenerator))
    }

    pub fn with_id_generator(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            banners: DashMap::new(),
            slots: DashMap::new(),
            social_groups: DashMap::new(),
            rosters: DashMap::new(),
            engine: BanditEngine::new(),
            ids,
        }
    }

    pub fn engine(&self) -> &BanditEngine {
        &self.engine
    }

    fn require(
        map: &DashMap<String, String>,
        kind: EntityKind,
        id: &str,
    ) -> RotatorResult<()> {
        if map.contains_key(id) {
            Ok(())
        } else {
            Err(RotatorError::not_found(kind, id))
        }
    }

    fn is_attached(&self, slot_id: &str, banner_id: &str) -> bool {
        self.rosters
            .get(slot_id)
            .map(|roster| roster.contains(banner_id))
            .unwrap_or(false)
    }

    /// Selector for `scope`, seeding it from the slot roster on first use.
    ///
    /// Seeding holds the slot's roster entry, the same guard attach and
    /// detach take, so a roster change either lands before the copy or finds
    /// the new scope already registered.
    fn scope_selector(&self, scope: &ScopeKey) -> Arc<Ucb1Selector> {
        if let Some(selector) = self.engine.scope(scope) {
            return selector;
        }
        let roster = self.rosters.entry(scope.slot_id.clone()).or_default();
        self.engine.scope_or_seed(scope, roster.iter().cloned())
    }

    /// Drop `banner_id` from the roster of `slot_id` and from every scope
    /// already seeded from it. Returns false if it was not on the roster.
    fn remove_from_slot(&self, slot_id: &str, banner_id: &str) -> bool {
        let Some(mut roster) = self.rosters.get_mut(slot_id) else {
            return false;
        };
        if !roster.remove(banner_id) {
            return false;
        }
        self.engine.for_slot(slot_id, |selector| {
            if let Err(e) = selector.delete_banner(banner_id) {
                debug!(slot_id, banner_id, error = %e, "Detached banner missing from seeded scope");
            }
        });
        true
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BannerStorage for LocalStorage {
    async fn create_banner(&self, description: &str) -> RotatorResult<String> {
        let id = self.ids.generate();
        self.banners.insert(id.clone(), description.to_string());
        Ok(id)
    }

    async fn delete_banner(&self, id: &str) -> RotatorResult<()> {
        self.banners
            .remove(id)
            .ok_or_else(|| RotatorError::not_found(EntityKind::Banner, id))?;

        let slots: Vec<String> = self.rosters.iter().map(|r| r.key().clone()).collect();
        for slot_id in slots {
            if self.remove_from_slot(&slot_id, id) {
                debug!(slot_id = %slot_id, banner_id = id, "Deleted banner detached from slot");
            }
        }
        Ok(())
    }

    async fn create_slot(&self, description: &str) -> RotatorResult<String> {
        let id = self.ids.generate();
        self.slots.insert(id.clone(), description.to_string());
        Ok(id)
    }

    async fn delete_slot(&self, id: &str) -> RotatorResult<()> {
        self.slots
            .remove(id)
            .ok_or_else(|| RotatorError::not_found(EntityKind::Slot, id))?;
        self.rosters.remove(id);
        let dropped = self.engine.remove_slot(id);
        debug!(slot_id = id, scopes = dropped, "Dropped slot state");
        Ok(())
    }

    async fn create_social_group(&self, description: &str) -> RotatorResult<String> {
        let id = self.ids.generate();
        self.social_groups.insert(id.clone(), description.to_string());
        Ok(id)
    }

    async fn delete_social_group(&self, id: &str) -> RotatorResult<()> {
        self.social_groups
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RotatorError::not_found(EntityKind::SocialGroup, id))
    }

    async fn attach_banner(&self, slot_id: &str, banner_id: &str) -> RotatorResult<()> {
        Self::require(&self.slots, EntityKind::Slot, slot_id)?;
        Self::require(&self.banners, EntityKind::Banner, banner_id)?;
        let mut roster = self.rosters.entry(slot_id.to_string()).or_default();
        roster.insert(banner_id.to_string());

        // Already-seeded scopes see the new banner as a cold arm.
        self.engine.for_slot(slot_id, |selector| {
            if selector.add_banner(banner_id).is_ok() {
                debug!(slot_id, banner_id, "Attached banner added to seeded scope");
            }
        });
        drop(roster);
        Ok(())
    }

    async fn detach_banner(&self, slot_id: &str, banner_id: &str) -> RotatorResult<()> {
        Self::require(&self.slots, EntityKind::Slot, slot_id)?;
        Self::require(&self.banners, EntityKind::Banner, banner_id)?;
        if !self.remove_from_slot(slot_id, banner_id) {
            return Err(RotatorError::not_attached(slot_id, banner_id));
        }
        Ok(())
    }

    async fn select_banner(&self, scope: &ScopeKey) -> RotatorResult<String> {
        Self::require(&self.slots, EntityKind::Slot, &scope.slot_id)?;
        Self::require(
            &self.social_groups,
            EntityKind::SocialGroup,
            &scope.social_group_id,
        )?;
        let banner_id = self.scope_selector(scope).select_banner()?;
        metrics::counter!("rotator.select", "backend" => "local").increment(1);
        Ok(banner_id)
    }

    async fn click_banner(&self, scope: &ScopeKey, banner_id: &str) -> RotatorResult<()> {
        Self::require(&self.slots, EntityKind::Slot, &scope.slot_id)?;
        Self::require(&self.banners, EntityKind::Banner, banner_id)?;
        Self::require(
            &self.social_groups,
            EntityKind::SocialGroup,
            &scope.social_group_id,
        )?;
        if !self.is_attached(&scope.slot_id, banner_id) {
            return Err(RotatorError::not_attached(scope.slot_id.as_str(), banner_id));
        }
        self.scope_selector(scope).register_click(banner_id)?;
        metrics::counter!("rotator.click", "backend" => "local").increment(1);
        Ok(())
    }
}
