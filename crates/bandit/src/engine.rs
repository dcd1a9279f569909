//! Per-scope registry of in-process selectors. Each (slot, social group)
//! pair owns an independent `Ucb1Selector`; scopes never share arms.

use crate::selector::{ArmStats, Selector, Ucb1Selector};
use dashmap::DashMap;
use rotator_core::error::RotatorResult;
use rotator_core::types::ScopeKey;
use std::sync::Arc;
use tracing::debug;

pub struct BanditEngine {
    scopes: DashMap<ScopeKey, Arc<Ucb1Selector>>,
}

impl BanditEngine {
    pub fn new() -> Self {
        Self {
            scopes: DashMap::new(),
        }
    }

    /// Selector for `scope`, seeding it from `roster` the first time the
    /// scope is seen. Later calls ignore the roster.
    pub fn scope_or_seed<I, S>(&self, scope: &ScopeKey, roster: I) -> Arc<Ucb1Selector>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(existing) = self.scopes.get(scope) {
            return existing.clone();
        }
        self.scopes
            .entry(scope.clone())
            .or_insert_with(|| {
                debug!(scope = %scope, "Seeding in-process bandit scope");
                Arc::new(Ucb1Selector::with_banners(roster))
            })
            .clone()
    }

    pub fn scope(&self, scope: &ScopeKey) -> Option<Arc<Ucb1Selector>> {
        self.scopes.get(scope).map(|s| s.clone())
    }

    pub fn select(&self, scope: &ScopeKey) -> Option<RotatorResult<String>> {
        self.scope(scope).map(|s| s.select_banner())
    }

    /// Apply `f` to every scope belonging to `slot_id`.
    pub fn for_slot(&self, slot_id: &str, mut f: impl FnMut(&Ucb1Selector)) {
        for entry in self.scopes.iter() {
            if entry.key().slot_id == slot_id {
                f(entry.value());
            }
        }
    }

    pub fn remove_scope(&self, scope: &ScopeKey) -> bool {
        self.scopes.remove(scope).is_some()
    }

    /// Drop every scope of `slot_id`, returning how many went.
    pub fn remove_slot(&self, slot_id: &str) -> usize {
        let before = self.scopes.len();
        self.scopes.retain(|scope, _| scope.slot_id != slot_id);
        before - self.scopes.len()
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn stats(&self, scope: &ScopeKey) -> Vec<ArmStats> {
        self.scope(scope).map(|s| s.stats()).unwrap_or_default()
    }
}

impl Default for BanditEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rotator_core::error::RotatorError;

    #[test]
    fn test_scopes_are_independent() {
        let engine = BanditEngine::new();
        let young = ScopeKey::new("s-1", "young");
        let senior = ScopeKey::new("s-1", "senior");

        let a = engine.scope_or_seed(&young, ["b-1", "b-2"]);
        let b = engine.scope_or_seed(&senior, ["b-1", "b-2"]);
        a.select_banner().unwrap();
        a.select_banner().unwrap();
        a.register_click("b-1").unwrap();

        assert_eq!(a.total_selects(), 3);
        assert_eq!(b.total_selects(), 0);
        assert_eq!(engine.scope_count(), 2);
    }

    #[test]
    fn test_roster_only_used_on_first_access() {
        let engine = BanditEngine::new();
        let scope = ScopeKey::new("s-1", "g-1");
        engine.scope_or_seed(&scope, ["b-1"]);
        let again = engine.scope_or_seed(&scope, ["b-1", "b-2", "b-3"]);
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn test_for_slot_and_remove() {
        let engine = BanditEngine::new();
        engine.scope_or_seed(&ScopeKey::new("s-1", "g-1"), ["b-1"]);
        engine.scope_or_seed(&ScopeKey::new("s-1", "g-2"), ["b-1"]);
        engine.scope_or_seed(&ScopeKey::new("s-2", "g-1"), ["b-1"]);

        let mut deleted = 0;
        engine.for_slot("s-1", |s| {
            if s.delete_banner("b-1").is_ok() {
                deleted += 1;
            }
        });
        assert_eq!(deleted, 2);
        assert!(matches!(
            engine.select(&ScopeKey::new("s-1", "g-1")),
            Some(Err(RotatorError::EmptyCandidates))
        ));
        assert_eq!(
            engine.select(&ScopeKey::new("s-2", "g-1")).unwrap().unwrap(),
            "b-1"
        );

        assert_eq!(engine.remove_slot("s-1"), 2);
        assert_eq!(engine.scope_count(), 1);
        assert!(engine.remove_scope(&ScopeKey::new("s-2", "g-1")));
        assert!(engine.select(&ScopeKey::new("s-2", "g-1")).is_none());
        assert!(engine.stats(&ScopeKey::new("s-2", "g-1")).is_empty());
    }
}
