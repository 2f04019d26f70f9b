use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::types::{Identity, Lookup, Period, QuotaRecord};
use crate::error::{QuotaError, Result};

/// Server-side quota counter store.
///
/// Treated as eventually consistent; there is no compare-and-set, so two
/// concurrent writers for the same identity can lose an update.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Point lookup by (identity, period); the identity carries the
    /// authenticated discriminator
    async fn lookup(&self, identity: &Identity, period: &Period) -> Lookup;

    /// Insert the record for its identity and period, or raise the stored
    /// count to the record's count. A write never lowers a stored count.
    async fn upsert(&self, record: &QuotaRecord) -> Result<()>;
}

/// In-memory store with switchable failures
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
    records: RwLock<HashMap<(Identity, Period), QuotaRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every lookup report a failure
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every upsert return an error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Put a count in place directly
    pub async fn seed(&self, identity: &Identity, period: Period, count: u32) {
        let record = QuotaRecord::new(identity, period, count);
        self.records
            .write()
            .await
            .insert((identity.clone(), period), record);
    }

    /// Stored count, ignoring failure switches
    pub async fn count(&self, identity: &Identity, period: &Period) -> Option<u32> {
        self.records
            .read()
            .await
            .get(&(identity.clone(), *period))
            .map(|record| record.count)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn lookup(&self, identity: &Identity, period: &Period) -> Lookup {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Lookup::Failed("simulated read failure".to_string());
        }

        match self.records.read().await.get(&(identity.clone(), *period)) {
            Some(record) => Lookup::Found(record.clone()),
            None => Lookup::NotFound,
        }
    }

    async fn upsert(&self, record: &QuotaRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(QuotaError::Store("simulated write failure".to_string()));
        }

        let mut records = self.records.write().await;
        let key = (record.owner(), record.period);
        let count = records
            .get(&key)
            .map_or(record.count, |existing| existing.count.max(record.count));

        let mut stored = record.clone();
        stored.count = count;
        stored.updated_at = Some(Utc::now());
        records.insert(key, stored);
        Ok(())
    }
}
