//! Integration tests for the download quota tracker

use chrono::NaiveDate;
use quota_rs::quota::{
    open_pool, FixedClock, Identity, LocalCache, MemoryCache, MemoryQuotaStore, QuotaRecord,
    QuotaStore, QuotaTracker, ReconcilePolicy, SqliteQuotaStore,
};
use std::sync::Arc;

struct Harness {
    store: Arc<MemoryQuotaStore>,
    cache: Arc<MemoryCache>,
    clock: Arc<FixedClock>,
    tracker: QuotaTracker,
}

fn setup() -> Harness {
    let store = Arc::new(MemoryQuotaStore::new());
    let cache = Arc::new(MemoryCache::new());
    let clock = Arc::new(FixedClock::new(date(2026, 10, 19)));
    let tracker = QuotaTracker::new(store.clone(), cache.clone()).with_clock(clock.clone());

    Harness {
        store,
        cache,
        clock,
        tracker,
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn anonymous() -> Identity {
    Identity::Anonymous("anon_0123456789abcdef".to_string())
}

fn account() -> Identity {
    Identity::Account("8f1c2d3e-user".to_string())
}

#[tokio::test]
async fn test_count_tracks_consecutive_downloads_up_to_cap() {
    for identity in [anonymous(), account()] {
        let h = setup();
        let cap = h.tracker.limits().cap_for(&identity, false).unwrap();

        for n in 1..=cap {
            let decision = h.tracker.check_and_consume(&identity, false).await;
            assert!(decision.is_allowed(), "{} download {} should pass", identity, n);
            assert_eq!(decision.usage().used, n);
        }

        let period = h.tracker.current_period();
        assert_eq!(h.store.count(&identity, &period).await, Some(cap));
        assert_eq!(h.cache.get(&period).count, cap);
    }
}

#[tokio::test]
async fn test_blocked_for_rest_of_period() {
    let h = setup();
    let identity = account();
    h.store
        .seed(&identity, h.tracker.current_period(), 6)
        .await;

    for day in [19, 25, 31] {
        h.clock.set(date(2026, 10, day));
        let decision = h.tracker.check_and_consume(&identity, false).await;
        assert!(!decision.is_allowed());
        assert_eq!(decision.usage().used, 6);
    }
}

#[tokio::test]
async fn test_anonymous_fourth_download_blocked() {
    let h = setup();
    let identity = anonymous();

    for expected in 1..=3 {
        let decision = h.tracker.check_and_consume(&identity, false).await;
        assert!(decision.is_allowed());
        assert_eq!(decision.usage().used, expected);
    }

    let decision = h.tracker.check_and_consume(&identity, false).await;
    assert!(!decision.is_allowed());
    assert!(decision.message().contains("3 downloads"));
    assert_eq!(decision.usage().remaining(), Some(0));
    assert_eq!(decision.redirect(), Some("/signup?redirect=/donate"));
}

#[tokio::test]
async fn test_authenticated_at_cap_redirects_to_donate() {
    let h = setup();
    let identity = account();
    h.store
        .seed(&identity, h.tracker.current_period(), 6)
        .await;

    let decision = h.tracker.check_and_consume(&identity, false).await;
    assert!(!decision.is_allowed());
    assert_eq!(decision.redirect(), Some("/donate"));
    assert_eq!(decision.usage().cap, Some(6));
}

#[tokio::test]
async fn test_donor_always_allowed() {
    let h = setup();
    let identity = account();
    let period = h.tracker.current_period();
    h.store.seed(&identity, period, 100).await;

    let decision = h.tracker.check_and_consume(&identity, true).await;
    assert!(decision.is_allowed());
    assert_eq!(decision.usage().used, 101);
    assert_eq!(decision.usage().cap, None);

    for _ in 0..10 {
        assert!(h.tracker.check_and_consume(&identity, true).await.is_allowed());
    }
    assert_eq!(h.store.count(&identity, &period).await, Some(111));
}

#[tokio::test]
async fn test_period_rollover_resets_effective_count() {
    let h = setup();
    let identity = anonymous();

    for _ in 0..3 {
        h.tracker.check_and_consume(&identity, false).await;
    }
    assert!(!h.tracker.check_and_consume(&identity, false).await.is_allowed());

    h.clock.set(date(2026, 11, 1));
    let decision = h.tracker.check_and_consume(&identity, false).await;
    assert!(decision.is_allowed());
    assert_eq!(decision.usage().used, 1);

    // Old rows are kept
    let october = "2026-10".parse().unwrap();
    assert_eq!(h.store.count(&identity, &october).await, Some(3));
}

#[tokio::test]
async fn test_rollover_discards_stale_local_cache() {
    let h = setup();
    let identity = account();
    for _ in 0..6 {
        h.tracker.check_and_consume(&identity, false).await;
    }

    // Nothing is cached or stored for November yet
    h.clock.set(date(2026, 11, 15));
    let usage = h.tracker.status(&identity, false).await;
    assert_eq!(usage.used, 0);
    assert_eq!(usage.remaining(), Some(6));
}

#[tokio::test]
async fn test_reconciliation_takes_larger_count() {
    let h = setup();
    let identity = account();
    let period = h.tracker.current_period();
    h.cache.set(&period, 2).unwrap();
    h.store.seed(&identity, period, 5).await;

    assert_eq!(h.tracker.status(&identity, false).await.used, 5);

    let decision = h.tracker.check_and_consume(&identity, false).await;
    assert!(decision.is_allowed());
    assert_eq!(decision.usage().used, 6);
    assert_eq!(h.cache.get(&period).count, 6);
}

#[tokio::test]
async fn test_cleared_cache_still_blocked_by_server_count() {
    let h = setup();
    let identity = anonymous();
    for _ in 0..3 {
        h.tracker.check_and_consume(&identity, false).await;
    }

    h.cache.clear();
    assert!(!h.tracker.check_and_consume(&identity, false).await.is_allowed());
}

#[tokio::test]
async fn test_upsert_failure_still_advances_local_count() {
    let h = setup();
    let identity = anonymous();
    let period = h.tracker.current_period();
    h.store.set_fail_writes(true);

    for expected in 1..=3 {
        let decision = h.tracker.check_and_consume(&identity, false).await;
        assert!(decision.is_allowed());
        assert_eq!(h.cache.get(&period).count, expected);
    }

    assert!(h.store.is_empty().await);
    assert!(!h.tracker.check_and_consume(&identity, false).await.is_allowed());
}

#[tokio::test]
async fn test_read_failure_fails_open() {
    let h = setup();
    let identity = account();
    h.store
        .seed(&identity, h.tracker.current_period(), 6)
        .await;
    h.store.set_fail_reads(true);

    // The server says 6, but it cannot be read: only the local count is used
    let decision = h.tracker.check_and_consume(&identity, false).await;
    assert!(decision.is_allowed());
    assert_eq!(decision.usage().used, 1);
}

#[tokio::test]
async fn test_read_failure_does_not_lower_server_count() {
    let h = setup();
    let identity = account();
    let period = h.tracker.current_period();
    h.store.seed(&identity, period, 6).await;

    h.store.set_fail_reads(true);
    assert!(h.tracker.check_and_consume(&identity, false).await.is_allowed());
    assert_eq!(h.store.count(&identity, &period).await, Some(6));

    // Once reads recover the cap holds again
    h.store.set_fail_reads(false);
    h.cache.clear();
    assert!(!h.tracker.check_and_consume(&identity, false).await.is_allowed());
}

#[tokio::test]
async fn test_prefer_local_never_lowers_sqlite_count() {
    let pool = open_pool("sqlite::memory:").await.unwrap();
    let store = Arc::new(SqliteQuotaStore::new(pool));
    store.init_db().await.unwrap();

    let clock = Arc::new(FixedClock::new(date(2026, 10, 19)));
    let tracker = QuotaTracker::new(store.clone(), Arc::new(MemoryCache::new()))
        .with_clock(clock)
        .with_reconcile_policy(ReconcilePolicy::PreferLocal);

    let identity = anonymous();
    let period = tracker.current_period();
    store
        .upsert(&QuotaRecord::new(&identity, period, 5))
        .await
        .unwrap();

    let decision = tracker.check_and_consume(&identity, false).await;
    assert!(decision.is_allowed());
    assert_eq!(decision.usage().used, 1);

    let record = store.fetch(&identity, &period).await.unwrap().unwrap();
    assert_eq!(record.count, 5);
}

#[tokio::test]
async fn test_identities_do_not_share_server_rows() {
    let h = setup();
    let period = h.tracker.current_period();
    let anon = Identity::Anonymous("shared".to_string());
    let acct = Identity::Account("shared".to_string());

    h.store.seed(&anon, period, 3).await;
    let usage = h.tracker.status(&acct, false).await;
    assert_eq!(usage.used, 0);
}
