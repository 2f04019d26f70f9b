//! Integration tests for the download gate

use async_trait::async_trait;
use chrono::NaiveDate;
use quota_rs::download::{AssetTransfer, DownloadGate, DownloadLog, PromptSurface};
use quota_rs::identity::{SessionProvider, StaticSession};
use quota_rs::quota::{
    Decision, FixedClock, Identity, LocalCache, MemoryCache, MemoryDonorDirectory, MemoryQuotaStore,
    QuotaTracker,
};
use quota_rs::QuotaError;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingTransfer {
    started: Mutex<Vec<u64>>,
    fail: bool,
}

#[async_trait]
impl AssetTransfer for RecordingTransfer {
    async fn trigger(&self, asset_id: u64) -> quota_rs::Result<()> {
        if self.fail {
            return Err(QuotaError::Store("transfer failed".to_string()));
        }
        self.started.lock().unwrap().push(asset_id);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPrompt {
    shown: Mutex<Vec<Decision>>,
}

impl PromptSurface for RecordingPrompt {
    fn show(&self, decision: &Decision) {
        self.shown.lock().unwrap().push(decision.clone());
    }
}

#[derive(Default)]
struct RecordingLog {
    entries: Mutex<Vec<(u64, Identity)>>,
}

#[async_trait]
impl DownloadLog for RecordingLog {
    async fn record(&self, asset_id: u64, identity: &Identity) -> quota_rs::Result<()> {
        self.entries.lock().unwrap().push((asset_id, identity.clone()));
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryQuotaStore>,
    cache: Arc<MemoryCache>,
    donors: Arc<MemoryDonorDirectory>,
    transfer: Arc<RecordingTransfer>,
    prompt: Arc<RecordingPrompt>,
    log: Arc<RecordingLog>,
    gate: DownloadGate,
}

fn setup(session: StaticSession, transfer: RecordingTransfer) -> Harness {
    let store = Arc::new(MemoryQuotaStore::new());
    let cache = Arc::new(MemoryCache::new());
    let donors = Arc::new(MemoryDonorDirectory::new());
    let transfer = Arc::new(transfer);
    let prompt = Arc::new(RecordingPrompt::default());
    let log = Arc::new(RecordingLog::default());

    let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()));
    let tracker = Arc::new(QuotaTracker::new(store.clone(), cache.clone()).with_clock(clock));
    let sessions: Arc<dyn SessionProvider> = Arc::new(session);

    let gate = DownloadGate::new(
        tracker,
        sessions,
        cache.clone(),
        donors.clone(),
        transfer.clone(),
        prompt.clone(),
    )
    .with_download_log(log.clone());

    Harness {
        store,
        cache,
        donors,
        transfer,
        prompt,
        log,
        gate,
    }
}

#[tokio::test]
async fn test_anonymous_downloads_until_prompt() {
    let h = setup(StaticSession::anonymous(), RecordingTransfer::default());

    for asset in ["11", "12", "13"] {
        assert!(h.gate.request_download(asset).await.unwrap().is_allowed());
    }
    let decision = h.gate.request_download("14").await.unwrap();

    assert!(!decision.is_allowed());
    assert_eq!(*h.transfer.started.lock().unwrap(), vec![11, 12, 13]);
    assert_eq!(h.log.entries.lock().unwrap().len(), 3);

    let shown = h.prompt.shown.lock().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0], decision);
}

#[tokio::test]
async fn test_anonymous_identity_is_stable() {
    let h = setup(StaticSession::anonymous(), RecordingTransfer::default());

    h.gate.request_download("1").await.unwrap();
    h.gate.request_download("2").await.unwrap();

    let identity = h.gate.identity().await.unwrap();
    let period = h.gate.tracker().current_period();
    assert_eq!(h.store.count(&identity, &period).await, Some(2));

    let entries = h.log.entries.lock().unwrap();
    assert!(entries.iter().all(|(_, logged)| *logged == identity));
}

#[tokio::test]
async fn test_donor_account_is_unlimited() {
    let h = setup(StaticSession::signed_in("donor-1"), RecordingTransfer::default());
    h.donors.add_donor("donor-1").await;

    for asset in 1..=10 {
        let decision = h.gate.request_download(&asset.to_string()).await.unwrap();
        assert!(decision.is_allowed());
    }
    assert!(h.prompt.shown.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_donor_lookup_failure_treated_as_non_donor() {
    let h = setup(StaticSession::signed_in("donor-1"), RecordingTransfer::default());
    h.donors.add_donor("donor-1").await;
    h.donors.set_fail(true);

    let identity = Identity::Account("donor-1".to_string());
    h.store
        .seed(&identity, h.gate.tracker().current_period(), 6)
        .await;

    let decision = h.gate.request_download("5").await.unwrap();
    assert!(!decision.is_allowed());
    assert_eq!(decision.redirect(), Some("/donate"));
}

#[tokio::test]
async fn test_malformed_asset_does_not_consume() {
    let h = setup(StaticSession::signed_in("user-1"), RecordingTransfer::default());

    let result = h.gate.request_download("amazing-grace.pdf").await;
    assert!(matches!(result, Err(QuotaError::InvalidAsset(_))));

    let period = h.gate.tracker().current_period();
    assert_eq!(h.cache.get(&period).count, 0);
    assert!(h.store.is_empty().await);
    assert!(h.transfer.started.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_transfer_failure_is_reported_after_counting() {
    let transfer = RecordingTransfer {
        fail: true,
        ..Default::default()
    };
    let h = setup(StaticSession::signed_in("user-1"), transfer);

    let result = h.gate.request_download("3").await;
    assert!(result.is_err());

    let identity = Identity::Account("user-1".to_string());
    let period = h.gate.tracker().current_period();
    assert_eq!(h.store.count(&identity, &period).await, Some(1));
    assert!(h.log.entries.lock().unwrap().is_empty());
}

