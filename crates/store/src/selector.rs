//! UCB1 over a shared store, one scope per (slot, social group).
//!
//! Counters (`selects`, `selects_total`, `clicks`) only ever change through
//! the store's atomic increments, so they stay exact under any number of
//! concurrent replicas. The score is different: it is recomputed from
//! counters read a moment earlier and written back with a plain overwrite,
//! so two replicas selecting the same banner at once may leave the score of
//! whichever wrote last, computed from slightly stale counters. The next
//! select or click of that banner repairs it. Scores steer exploration and
//! nothing reads them for accounting.

use crate::backend::AtomicStore;
use crate::error::StoreError;
use crate::keys;
use async_trait::async_trait;
use rotator_bandit::ucb1_score;
use rotator_core::error::{EntityKind, RotatorError, RotatorResult};
use rotator_core::ids::{IdGenerator, UuidGenerator};
use rotator_core::storage::BannerStorage;
use rotator_core::types::ScopeKey;
use std::sync::Arc;
use tracing::{debug, info};

/// Score given to roster members that have not been shown in a scope yet.
/// Every such banner outranks every banner with a real score.
const UNSEEN_SCORE: f64 = f64::INFINITY;

fn op_err<'a>(op: &'a str, key: &'a str) -> impl FnOnce(StoreError) -> RotatorError + 'a {
    move |e| RotatorError::store(format!("{op} '{key}'"), e)
}

pub struct StoreSelector<S> {
    store: Arc<S>,
    ids: Arc<dyn IdGenerator>,
}

impl<S: AtomicStore> StoreSelector<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_id_generator(store, Arc::new(UuidGenerator))
    }

    pub fn with_id_generator(store: Arc<S>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { store, ids }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    async fn require(&self, registry: &str, kind: EntityKind, id: &str) -> RotatorResult<()> {
        let found = self
            .store
            .hexists(registry, id)
            .await
            .map_err(op_err("hexists", registry))?;
        if found {
            Ok(())
        } else {
            Err(RotatorError::not_found(kind, id))
        }
    }

    async fn create(&self, registry: &str, description: &str) -> RotatorResult<String> {
        let id = self.ids.generate();
        self.store
            .hset(registry, &id, description)
            .await
            .map_err(op_err("hset", registry))?;
        Ok(id)
    }

    async fn delete(&self, registry: &str, kind: EntityKind, id: &str) -> RotatorResult<()> {
        let removed = self
            .store
            .hdel(registry, id)
            .await
            .map_err(op_err("hdel", registry))?;
        if removed {
            Ok(())
        } else {
            Err(RotatorError::not_found(kind, id))
        }
    }

    /// Copy the slot roster into the scope's scored collection the first
    /// time the scope is touched, and register the scope with its slot so
    /// later attach/detach calls reach it.
    async fn ensure_seeded(&self, scope: &ScopeKey) -> RotatorResult<()> {
        let scores_key = keys::scope_scores(&scope.slot_id, &scope.social_group_id);
        let seeded = self
            .store
            .exists(&scores_key)
            .await
            .map_err(op_err("exists", &scores_key))?;
        if seeded {
            return Ok(());
        }

        let index_key = keys::slot_scopes(&scope.slot_id);
        self.store
            .zadd_nx(&index_key, &scope.social_group_id, 0.0)
            .await
            .map_err(op_err("zadd", &index_key))?;

        let roster_key = keys::slot_banners(&scope.slot_id);
        let copied = self
            .store
            .copy_scored(&roster_key, &scores_key, UNSEEN_SCORE)
            .await
            .map_err(op_err("copy", &roster_key))?;
        if copied > 0 {
            metrics::counter!("rotator.seed").increment(1);
            info!(scope = %scope, banners = copied, "Seeded scope from slot roster");
        }
        Ok(())
    }

    async fn seeded_groups(&self, slot_id: &str) -> RotatorResult<Vec<String>> {
        let index_key = keys::slot_scopes(slot_id);
        self.store
            .zmembers(&index_key)
            .await
            .map_err(op_err("zrange", &index_key))
    }

    /// Drop `banner_id` from the slot roster and from every seeded scope's
    /// candidates. Counters stay. Returns false if it was not on the roster.
    async fn remove_from_slot(&self, slot_id: &str, banner_id: &str) -> RotatorResult<bool> {
        let roster_key = keys::slot_banners(slot_id);
        let removed = self
            .store
            .zrem(&roster_key, banner_id)
            .await
            .map_err(op_err("zrem", &roster_key))?;
        if !removed {
            return Ok(false);
        }
        for group in self.seeded_groups(slot_id).await? {
            let scores_key = keys::scope_scores(slot_id, &group);
            self.store
                .zrem(&scores_key, banner_id)
                .await
                .map_err(op_err("zrem", &scores_key))?;
        }
        Ok(true)
    }

    async fn write_score(&self, scope: &ScopeKey, banner_id: &str, score: f64) -> RotatorResult<()> {
        let scores_key = keys::scope_scores(&scope.slot_id, &scope.social_group_id);
        // XX: a banner detached in the meantime must not come back.
        self.store
            .zadd_xx(&scores_key, banner_id, score)
            .await
            .map_err(op_err("zadd", &scores_key))
    }
}

#[async_trait]
impl<S: AtomicStore + 'static> BannerStorage for StoreSelector<S> {
    async fn create_banner(&self, description: &str) -> RotatorResult<String> {
        self.create(keys::BANNERS, description).await
    }

    async fn delete_banner(&self, id: &str) -> RotatorResult<()> {
        self.delete(keys::BANNERS, EntityKind::Banner, id).await?;

        let slots = self
            .store
            .hkeys(keys::SLOTS)
            .await
            .map_err(op_err("hkeys", keys::SLOTS))?;
        for slot_id in slots {
            if self.remove_from_slot(&slot_id, id).await? {
                debug!(slot_id = %slot_id, banner_id = id, "Deleted banner detached from slot");
            }
        }
        Ok(())
    }

    async fn create_slot(&self, description: &str) -> RotatorResult<String> {
        self.create(keys::SLOTS, description).await
    }

    async fn delete_slot(&self, id: &str) -> RotatorResult<()> {
        self.delete(keys::SLOTS, EntityKind::Slot, id).await?;

        let mut stale = vec![keys::slot_banners(id)];
        for group in self.seeded_groups(id).await? {
            stale.push(keys::scope_scores(id, &group));
            stale.push(keys::scope_selects(id, &group));
            stale.push(keys::scope_clicks(id, &group));
            stale.push(keys::scope_selects_total(id, &group));
        }
        stale.push(keys::slot_scopes(id));
        for key in &stale {
            self.store.del(key).await.map_err(op_err("del", key))?;
        }
        debug!(slot_id = id, keys = stale.len(), "Dropped slot state");
        Ok(())
    }

    async fn create_social_group(&self, description: &str) -> RotatorResult<String> {
        self.create(keys::SOCIAL_GROUPS, description).await
    }

    async fn delete_social_group(&self, id: &str) -> RotatorResult<()> {
        self.delete(keys::SOCIAL_GROUPS, EntityKind::SocialGroup, id)
            .await
    }

    async fn attach_banner(&self, slot_id: &str, banner_id: &str) -> RotatorResult<()> {
        self.require(keys::SLOTS, EntityKind::Slot, slot_id).await?;
        self.require(keys::BANNERS, EntityKind::Banner, banner_id)
            .await?;

        let roster_key = keys::slot_banners(slot_id);
        self.store
            .zadd(&roster_key, banner_id, UNSEEN_SCORE)
            .await
            .map_err(op_err("zadd", &roster_key))?;

        for group in self.seeded_groups(slot_id).await? {
            let scores_key = keys::scope_scores(slot_id, &group);
            self.store
                .zadd_nx(&scores_key, banner_id, UNSEEN_SCORE)
                .await
                .map_err(op_err("zadd", &scores_key))?;
        }
        Ok(())
    }

    async fn detach_banner(&self, slot_id: &str, banner_id: &str) -> RotatorResult<()> {
        self.require(keys::SLOTS, EntityKind::Slot, slot_id).await?;
        self.require(keys::BANNERS, EntityKind::Banner, banner_id)
            .await?;

        if !self.remove_from_slot(slot_id, banner_id).await? {
            return Err(RotatorError::not_attached(slot_id, banner_id));
        }
        Ok(())
    }

    async fn select_banner(&self, scope: &ScopeKey) -> RotatorResult<String> {
        let (slot_id, group_id) = (scope.slot_id.as_str(), scope.social_group_id.as_str());
        self.require(keys::SLOTS, EntityKind::Slot, slot_id).await?;
        self.require(keys::SOCIAL_GROUPS, EntityKind::SocialGroup, group_id)
            .await?;
        self.ensure_seeded(scope).await?;

        let scores_key = keys::scope_scores(slot_id, group_id);
        let banner_id = self
            .store
            .ztop(&scores_key)
            .await
            .map_err(op_err("zrevrange", &scores_key))?
            .ok_or(RotatorError::EmptyCandidates)?;

        let selects_key = keys::scope_selects(slot_id, group_id);
        let selects = self
            .store
            .hincr(&selects_key, &banner_id)
            .await
            .map_err(op_err("hincrby", &selects_key))?;
        let total_key = keys::scope_selects_total(slot_id, group_id);
        let total = self
            .store
            .incr(&total_key)
            .await
            .map_err(op_err("incr", &total_key))?;
        let clicks_key = keys::scope_clicks(slot_id, group_id);
        let clicks = self
            .store
            .hget_or(&clicks_key, &banner_id, 0)
            .await
            .map_err(op_err("hget", &clicks_key))?;

        let score = ucb1_score(selects as u64, clicks as u64, total as u64);
        self.write_score(scope, &banner_id, score).await?;

        metrics::counter!("rotator.select", "backend" => "store").increment(1);
        debug!(scope = %scope, banner_id = %banner_id, selects, clicks, total, score, "Banner selected");
        Ok(banner_id)
    }

    async fn click_banner(&self, scope: &ScopeKey, banner_id: &str) -> RotatorResult<()> {
        let (slot_id, group_id) = (scope.slot_id.as_str(), scope.social_group_id.as_str());
        self.require(keys::SLOTS, EntityKind::Slot, slot_id).await?;
        self.require(keys::BANNERS, EntityKind::Banner, banner_id)
            .await?;
        self.require(keys::SOCIAL_GROUPS, EntityKind::SocialGroup, group_id)
            .await?;

        let roster_key = keys::slot_banners(slot_id);
        let attached = self
            .store
            .zscore(&roster_key, banner_id)
            .await
            .map_err(op_err("zscore", &roster_key))?
            .is_some();
        if !attached {
            return Err(RotatorError::not_attached(slot_id, banner_id));
        }
        self.ensure_seeded(scope).await?;

        let clicks_key = keys::scope_clicks(slot_id, group_id);
        let clicks = self
            .store
            .hincr(&clicks_key, banner_id)
            .await
            .map_err(op_err("hincrby", &clicks_key))?;

        // A click on a banner never selected in this scope counts as its
        // first select, same as the in-process selector's promotion.
        let selects_key = keys::scope_selects(slot_id, group_id);
        let total_key = keys::scope_selects_total(slot_id, group_id);
        let promoted = self
            .store
            .hset_nx(&selects_key, banner_id, 1)
            .await
            .map_err(op_err("hsetnx", &selects_key))?;
        if promoted {
            self.store
                .incr(&total_key)
                .await
                .map_err(op_err("incr", &total_key))?;
        }

        let selects = self
            .store
            .hget_or(&selects_key, banner_id, 1)
            .await
            .map_err(op_err("hget", &selects_key))?;
        let total = self
            .store
            .get_or(&total_key, 1)
            .await
            .map_err(op_err("get", &total_key))?;

        let score = ucb1_score(selects as u64, clicks as u64, total as u64);
        self.write_score(scope, banner_id, score).await?;

        metrics::counter!("rotator.click", "backend" => "store").increment(1);
        debug!(scope = %scope, banner_id, selects, clicks, total, score, promoted, "Click registered");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use rotator_core::ids::SequentialGenerator;
    use std::collections::HashSet;

    struct Fixture {
        selector: StoreSelector<MemoryStore>,
        store: Arc<MemoryStore>,
        slot: String,
        group: String,
        banners: Vec<String>,
    }

    impl Fixture {
        fn scope(&self) -> ScopeKey {
            ScopeKey::new(&self.slot, &self.group)
        }
    }

    async fn fixture(banners: usize) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let selector =
            StoreSelector::with_id_generator(store.clone(), Arc::new(SequentialGenerator::new("id")));
        let slot = selector.create_slot("sidebar").await.unwrap();
        let group = selector.create_social_group("retirees").await.unwrap();
        let mut ids = Vec::new();
        for i in 0..banners {
            let id = selector.create_banner(&format!("banner {i}")).await.unwrap();
            selector.attach_banner(&slot, &id).await.unwrap();
            ids.push(id);
        }
        Fixture {
            selector,
            store,
            slot,
            group,
            banners: ids,
        }
    }

    #[tokio::test]
    async fn test_registry_roundtrip() {
        let f = fixture(1).await;
        assert!(f.store.hexists(keys::BANNERS, &f.banners[0]).await.unwrap());
        f.selector.delete_banner(&f.banners[0]).await.unwrap();
        assert!(matches!(
            f.selector.delete_banner(&f.banners[0]).await.unwrap_err(),
            RotatorError::NotFound { kind: EntityKind::Banner, .. }
        ));
        f.selector.delete_social_group(&f.group).await.unwrap();
        assert!(matches!(
            f.selector.delete_social_group(&f.group).await.unwrap_err(),
            RotatorError::NotFound { kind: EntityKind::SocialGroup, .. }
        ));
    }

    #[tokio::test]
    async fn test_attach_puts_banner_at_infinity() {
        let f = fixture(1).await;
        let score = f
            .store
            .zscore(&keys::slot_banners(&f.slot), &f.banners[0])
            .await
            .unwrap();
        assert_eq!(score, Some(f64::INFINITY));
    }

    #[tokio::test]
    async fn test_attach_requires_slot_and_banner() {
        let f = fixture(1).await;
        assert!(matches!(
            f.selector.attach_banner("nope", &f.banners[0]).await.unwrap_err(),
            RotatorError::NotFound { kind: EntityKind::Slot, .. }
        ));
        assert!(matches!(
            f.selector.attach_banner(&f.slot, "nope").await.unwrap_err(),
            RotatorError::NotFound { kind: EntityKind::Banner, .. }
        ));
    }

    #[tokio::test]
    async fn test_detach_unattached_banner() {
        let f = fixture(0).await;
        let banner = f.selector.create_banner("loose").await.unwrap();
        assert!(matches!(
            f.selector.detach_banner(&f.slot, &banner).await.unwrap_err(),
            RotatorError::NotAttached { .. }
        ));
    }

    #[tokio::test]
    async fn test_select_seeds_and_covers_every_banner() {
        let f = fixture(3).await;
        let scope = f.scope();
        let mut seen = HashSet::new();
        for _ in 0..3 {
            seen.insert(f.selector.select_banner(&scope).await.unwrap());
        }
        assert_eq!(seen, f.banners.iter().cloned().collect::<HashSet<_>>());

        let total = f
            .store
            .get_int(&keys::scope_selects_total(&f.slot, &f.group))
            .await
            .unwrap();
        assert_eq!(total, Some(3));
        for banner in &f.banners {
            let selects = f
                .store
                .hget_int(&keys::scope_selects(&f.slot, &f.group), banner)
                .await
                .unwrap();
            assert_eq!(selects, Some(1));
            let score = f
                .store
                .zscore(&keys::scope_scores(&f.slot, &f.group), banner)
                .await
                .unwrap()
                .unwrap();
            assert!(score.is_finite() && score >= 0.0);
        }
    }

    #[tokio::test]
    async fn test_clicked_banner_wins_after_cold_start() {
        let f = fixture(3).await;
        let scope = f.scope();
        for _ in 0..3 {
            f.selector.select_banner(&scope).await.unwrap();
        }
        f.selector.click_banner(&scope, &f.banners[0]).await.unwrap();
        assert_eq!(f.selector.select_banner(&scope).await.unwrap(), f.banners[0]);
    }

    #[tokio::test]
    async fn test_select_errors() {
        let f = fixture(0).await;
        assert!(matches!(
            f.selector
                .select_banner(&ScopeKey::new("nope", &f.group))
                .await
                .unwrap_err(),
            RotatorError::NotFound { kind: EntityKind::Slot, .. }
        ));
        assert!(matches!(
            f.selector
                .select_banner(&ScopeKey::new(&f.slot, "nope"))
                .await
                .unwrap_err(),
            RotatorError::NotFound { kind: EntityKind::SocialGroup, .. }
        ));
        assert!(matches!(
            f.selector.select_banner(&f.scope()).await.unwrap_err(),
            RotatorError::EmptyCandidates
        ));
    }

    #[tokio::test]
    async fn test_click_score_after_one_select() {
        let f = fixture(1).await;
        let scope = f.scope();
        f.selector.select_banner(&scope).await.unwrap();
        f.selector.click_banner(&scope, &f.banners[0]).await.unwrap();

        let score = f
            .store
            .zscore(&keys::scope_scores(&f.slot, &f.group), &f.banners[0])
            .await
            .unwrap();
        assert_eq!(score, Some(ucb1_score(1, 1, 1)));
    }

    #[tokio::test]
    async fn test_click_before_select_promotes() {
        let f = fixture(2).await;
        let scope = f.scope();
        f.selector.click_banner(&scope, &f.banners[1]).await.unwrap();

        let selects_key = keys::scope_selects(&f.slot, &f.group);
        let total_key = keys::scope_selects_total(&f.slot, &f.group);
        assert_eq!(f.store.hget_int(&selects_key, &f.banners[1]).await.unwrap(), Some(1));
        assert_eq!(f.store.get_int(&total_key).await.unwrap(), Some(1));

        // The clicked banner is warm now; the other is still at +inf.
        assert_eq!(f.selector.select_banner(&scope).await.unwrap(), f.banners[0]);
        assert_eq!(f.store.get_int(&total_key).await.unwrap(), Some(2));

        // Second click on the same banner does not promote again.
        f.selector.click_banner(&scope, &f.banners[1]).await.unwrap();
        assert_eq!(f.store.hget_int(&selects_key, &f.banners[1]).await.unwrap(), Some(1));
        assert_eq!(f.store.get_int(&total_key).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_click_errors() {
        let f = fixture(1).await;
        let loose = f.selector.create_banner("loose").await.unwrap();
        assert!(matches!(
            f.selector.click_banner(&f.scope(), &loose).await.unwrap_err(),
            RotatorError::NotAttached { .. }
        ));
        assert!(matches!(
            f.selector.click_banner(&f.scope(), "nope").await.unwrap_err(),
            RotatorError::NotFound { kind: EntityKind::Banner, .. }
        ));
        assert!(matches!(
            f.selector
                .click_banner(&ScopeKey::new(&f.slot, "nope"), &f.banners[0])
                .await
                .unwrap_err(),
            RotatorError::NotFound { kind: EntityKind::SocialGroup, .. }
        ));
    }

    #[tokio::test]
    async fn test_attach_after_seeding_is_preferred() {
        let f = fixture(2).await;
        let scope = f.scope();
        f.selector.select_banner(&scope).await.unwrap();
        f.selector.select_banner(&scope).await.unwrap();

        let fresh = f.selector.create_banner("fresh").await.unwrap();
        f.selector.attach_banner(&f.slot, &fresh).await.unwrap();
        assert_eq!(f.selector.select_banner(&scope).await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn test_detach_removes_from_seeded_scope() {
        let f = fixture(2).await;
        let scope = f.scope();
        f.selector.select_banner(&scope).await.unwrap();
        f.selector.detach_banner(&f.slot, &f.banners[0]).await.unwrap();
        f.selector.detach_banner(&f.slot, &f.banners[1]).await.unwrap();
        assert!(matches!(
            f.selector.select_banner(&scope).await.unwrap_err(),
            RotatorError::EmptyCandidates
        ));
    }

    #[tokio::test]
    async fn test_scopes_learn_independently() {
        let f = fixture(2).await;
        let other_group = f.selector.create_social_group("students").await.unwrap();
        let a = f.scope();
        let b = ScopeKey::new(&f.slot, &other_group);
        for _ in 0..2 {
            f.selector.select_banner(&a).await.unwrap();
        }
        f.selector.click_banner(&a, &f.banners[1]).await.unwrap();

        assert_eq!(
            f.store
                .get_int(&keys::scope_selects_total(&f.slot, &other_group))
                .await
                .unwrap(),
            None
        );
        f.selector.select_banner(&b).await.unwrap();
        assert_eq!(
            f.store
                .get_int(&keys::scope_selects_total(&f.slot, &other_group))
                .await
                .unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_delete_slot_drops_state() {
        let f = fixture(2).await;
        f.selector.select_banner(&f.scope()).await.unwrap();
        f.selector.delete_slot(&f.slot).await.unwrap();
        for key in [
            keys::slot_banners(&f.slot),
            keys::slot_scopes(&f.slot),
            keys::scope_scores(&f.slot, &f.group),
            keys::scope_selects_total(&f.slot, &f.group),
        ] {
            assert!(!f.store.exists(&key).await.unwrap(), "{key} survived");
        }
        assert!(matches!(
            f.selector.delete_slot(&f.slot).await.unwrap_err(),
            RotatorError::NotFound { kind: EntityKind::Slot, .. }
        ));
    }

    #[tokio::test]
    async fn test_deleted_banner_leaves_rotation() {
        let f = fixture(2).await;
        let scope = f.scope();
        f.selector.select_banner(&scope).await.unwrap();
        f.selector.select_banner(&scope).await.unwrap();

        f.selector.delete_banner(&f.banners[0]).await.unwrap();
        let roster = f.store.zmembers(&keys::slot_banners(&f.slot)).await.unwrap();
        assert_eq!(roster, vec![f.banners[1].clone()]);
        for _ in 0..5 {
            assert_eq!(f.selector.select_banner(&scope).await.unwrap(), f.banners[1]);
        }

        let late = f.selector.create_social_group("late").await.unwrap();
        let later = ScopeKey::new(&f.slot, &late);
        for _ in 0..3 {
            assert_eq!(f.selector.select_banner(&later).await.unwrap(), f.banners[1]);
        }
    }
}
