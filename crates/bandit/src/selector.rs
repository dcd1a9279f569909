//! In-process UCB1 selector. One value is one bandit scope; every operation
//! takes the same mutex, so throughput per scope is bounded by contention on
//! that lock.

use crate::score::ucb1_score;
use parking_lot::Mutex;
use rotator_core::error::{EntityKind, RotatorError, RotatorResult};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Banner selection algorithm over a single scope.
pub trait Selector: Send + Sync {
    /// Put a banner into rotation. Fails with `AlreadyExists` if it is tracked.
    fn add_banner(&self, banner_id: &str) -> RotatorResult<()>;

    /// Take a banner out of rotation. Fails with `NotFound` if it is not tracked.
    fn delete_banner(&self, banner_id: &str) -> RotatorResult<()>;

    /// Pick the banner to show. Fails with `EmptyCandidates` when nothing is tracked.
    fn select_banner(&self) -> RotatorResult<String>;

    /// Record a click. Fails with `NotFound` if the banner is not tracked.
    fn register_click(&self, banner_id: &str) -> RotatorResult<()>;
}

/// Point-in-time view of one arm.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmStats {
    pub banner_id: String,
    pub selects: u64,
    pub clicks: u64,
    /// `None` while the arm is still cold.
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default)]
struct Arm {
    selects: u64,
    clicks: u64,
    score: f64,
}

#[derive(Debug, Default)]
struct ArmSet {
    cold: HashSet<String>,
    warm: HashMap<String, Arm>,
    best: Option<(String, f64)>,
    total_selects: u64,
}

impl ArmSet {
    fn contains(&self, banner_id: &str) -> bool {
        self.cold.contains(banner_id) || self.warm.contains_key(banner_id)
    }

    /// Move a cold arm to warm with one recorded select (and optionally one click).
    fn promote(&mut self, banner_id: String, clicks: u64) -> f64 {
        self.total_selects += 1;
        let score = ucb1_score(1, clicks, self.total_selects);
        self.warm.insert(
            banner_id.clone(),
            Arm {
                selects: 1,
                clicks,
                score,
            },
        );
        self.refresh_best(&banner_id, score);
        score
    }

    /// Keep the cached maximum consistent after `banner_id` was rescored.
    fn refresh_best(&mut self, banner_id: &str, score: f64) {
        let (is_best, best_score) = match &self.best {
            Some((id, best)) => (id == banner_id, *best),
            None => (false, f64::NEG_INFINITY),
        };
        if is_best && score < best_score {
            self.best = self.rescan();
        } else if is_best || score > best_score {
            self.best = Some((banner_id.to_string(), score));
        }
    }

    /// Full O(n) pass over warm arms. Scores are brought up to date with the
    /// current scope total on the way, since untouched arms keep the bonus
    /// they had when last selected or clicked.
    fn rescan(&mut self) -> Option<(String, f64)> {
        let total = self.total_selects;
        let mut best: Option<(&String, f64)> = None;
        for (id, arm) in self.warm.iter_mut() {
            arm.score = ucb1_score(arm.selects, arm.clicks, total);
            if best.map_or(true, |(_, score)| arm.score > score) {
                best = Some((id, arm.score));
            }
        }
        best.map(|(id, score)| (id.clone(), score))
    }
}

/// Mutex-guarded UCB1 bandit with strict cold start: every banner is shown
/// once before the score formula is applied to it.
#[derive(Default)]
pub struct Ucb1Selector {
    state: Mutex<ArmSet>,
}

impl Ucb1Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selector pre-populated from a roster. Duplicates are ignored.
    pub fn with_banners<I, S>(banner_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selector = Self::new();
        {
            let mut state = selector.state.lock();
            state.cold.extend(banner_ids.into_iter().map(Into::into));
        }
        selector
    }

    pub fn total_selects(&self) -> u64 {
        self.state.lock().total_selects
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.cold.len() + state.warm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every tracked arm, cold arms included.
    pub fn stats(&self) -> Vec<ArmStats> {
        let state = self.state.lock();
        let cold = state.cold.iter().map(|id| ArmStats {
            banner_id: id.clone(),
            selects: 0,
            clicks: 0,
            score: None,
        });
        let warm = state.warm.iter().map(|(id, arm)| ArmStats {
            banner_id: id.clone(),
            selects: arm.selects,
            clicks: arm.clicks,
            score: Some(arm.score),
        });
        cold.chain(warm).collect()
    }
}

impl Selector for Ucb1Selector {
    fn add_banner(&self, banner_id: &str) -> RotatorResult<()> {
        let mut state = self.state.lock();
        if state.contains(banner_id) {
            return Err(RotatorError::already_exists(EntityKind::Banner, banner_id));
        }
        state.cold.insert(banner_id.to_string());
        Ok(())
    }

    fn delete_banner(&self, banner_id: &str) -> RotatorResult<()> {
        let mut state = self.state.lock();
        if state.cold.remove(banner_id) {
            return Ok(());
        }
        let arm = state
            .warm
            .remove(banner_id)
            .ok_or_else(|| RotatorError::not_found(EntityKind::Banner, banner_id))?;
        state.total_selects -= arm.selects;
        let was_best = matches!(&state.best, Some((id, _)) if id == banner_id);
        if was_best {
            state.best = state.rescan();
        }
        Ok(())
    }

    fn select_banner(&self) -> RotatorResult<String> {
        let mut state = self.state.lock();

        // HashSet iteration order is unspecified: cold arms come out in no
        // particular order, not round-robin.
        if let Some(banner_id) = state.cold.iter().next().cloned() {
            state.cold.remove(&banner_id);
            let score = state.promote(banner_id.clone(), 0);
            debug!(banner_id = %banner_id, score, "Cold banner selected");
            return Ok(banner_id);
        }

        let banner_id = match &state.best {
            Some((id, _)) => id.clone(),
            None => return Err(RotatorError::EmptyCandidates),
        };
        let total = state.total_selects + 1;
        let arm = state
            .warm
            .get_mut(&banner_id)
            .ok_or_else(|| RotatorError::not_found(EntityKind::Banner, banner_id.as_str()))?;
        arm.selects += 1;
        arm.score = ucb1_score(arm.selects, arm.clicks, total);
        let score = arm.score;
        state.total_selects = total;
        state.refresh_best(&banner_id, score);
        Ok(banner_id)
    }

    fn register_click(&self, banner_id: &str) -> RotatorResult<()> {
        let mut state = self.state.lock();
        let total = state.total_selects;

        if let Some(arm) = state.warm.get_mut(banner_id) {
            arm.clicks += 1;
            arm.score = ucb1_score(arm.selects, arm.clicks, total);
            let score = arm.score;
            state.refresh_best(banner_id, score);
            return Ok(());
        }

        // A click implies the banner was shown at least once.
        if state.cold.remove(banner_id) {
            let score = state.promote(banner_id.to_string(), 1);
            debug!(banner_id = %banner_id, score, "Click promoted cold banner");
            return Ok(());
        }

        Err(RotatorError::not_found(EntityKind::Banner, banner_id))
    }
}
