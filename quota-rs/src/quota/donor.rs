use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::error::{QuotaError, Result};

/// Donor-status lookup for authenticated accounts
#[async_trait]
pub trait DonorDirectory: Send + Sync {
    /// Whether the account has donated; an unknown account has not
    async fn has_donated(&self, account_id: &str) -> Result<bool>;
}

/// In-memory donor list
#[derive(Debug, Default)]
pub struct MemoryDonorDirectory {
    donors: RwLock<HashSet<String>>,
    fail: AtomicBool,
}

impl MemoryDonorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_donor(&self, account_id: &str) {
        self.donors.write().await.insert(account_id.to_string());
    }

    /// Make every lookup return an error
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DonorDirectory for MemoryDonorDirectory {
    async fn has_donated(&self, account_id: &str) -> Result<bool> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QuotaError::Store("simulated donor lookup failure".to_string()));
        }
        Ok(self.donors.read().await.contains(account_id))
    }
}
