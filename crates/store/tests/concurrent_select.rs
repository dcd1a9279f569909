//! Many workers selecting from one scope at once must not lose counter
//! updates, whatever happens to the scores.

#![allow(clippy::unwrap_used)]

use rotator_core::storage::BannerStorage;
use rotator_core::types::ScopeKey;
use rotator_store::{keys, AtomicStore, MemoryStore, StoreSelector};
use std::sync::Arc;

const WORKERS: usize = 8;
const SELECTS_PER_WORKER: usize = 50;
const BANNERS: usize = 5;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_selects_keep_counters_exact() {
    let store = Arc::new(MemoryStore::new());
    let selector = Arc::new(StoreSelector::new(store.clone()));

    let slot = selector.create_slot("homepage").await.unwrap();
    let group = selector.create_social_group("everyone").await.unwrap();
    let mut banners = Vec::new();
    for i in 0..BANNERS {
        let id = selector.create_banner(&format!("banner {i}")).await.unwrap();
        selector.attach_banner(&slot, &id).await.unwrap();
        banners.push(id);
    }
    let scope = ScopeKey::new(&slot, &group);

    let mut handles = Vec::new();
    for _ in 0..WORKERS {
        let selector = selector.clone();
        let scope = scope.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..SELECTS_PER_WORKER {
                selector.select_banner(&scope).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = store
        .get_int(&keys::scope_selects_total(&slot, &group))
        .await
        .unwrap();
    assert_eq!(total, Some((WORKERS * SELECTS_PER_WORKER) as i64));

    let mut sum = 0;
    for banner in &banners {
        let selects = store
            .hget_int(&keys::scope_selects(&slot, &group), banner)
            .await
            .unwrap()
            .unwrap_or(0);
        assert!(selects >= 1, "banner {banner} was never shown");
        sum += selects;
    }
    assert_eq!(sum, (WORKERS * SELECTS_PER_WORKER) as i64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clicks_and_selects_agree_on_totals() {
    let store = Arc::new(MemoryStore::new());
    let selector = Arc::new(StoreSelector::new(store.clone()));

    let slot = selector.create_slot("footer").await.unwrap();
    let group = selector.create_social_group("night owls").await.unwrap();
    let mut banners = Vec::new();
    for i in 0..BANNERS {
        let id = selector.create_banner(&format!("banner {i}")).await.unwrap();
        selector.attach_banner(&slot, &id).await.unwrap();
        banners.push(id);
    }
    let scope = ScopeKey::new(&slot, &group);

    let mut handles = Vec::new();
    for w in 0..WORKERS {
        let selector = selector.clone();
        let scope = scope.clone();
        let clicked = banners[w % BANNERS].clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..SELECTS_PER_WORKER {
                selector.select_banner(&scope).await.unwrap();
                selector.click_banner(&scope, &clicked).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let total = store
        .get_int(&keys::scope_selects_total(&slot, &group))
        .await
        .unwrap()
        .unwrap();
    let mut selects_sum = 0;
    let mut clicks_sum = 0;
    for banner in &banners {
        selects_sum += store
            .hget_int(&keys::scope_selects(&slot, &group), banner)
            .await
            .unwrap()
            .unwrap_or(0);
        clicks_sum += store
            .hget_int(&keys::scope_clicks(&slot, &group), banner)
            .await
            .unwrap()
            .unwrap_or(0);
    }
    assert_eq!(total, selects_sum);
    assert_eq!(clicks_sum, (WORKERS * SELECTS_PER_WORKER) as i64);
}
