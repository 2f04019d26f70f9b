//! Download gate
//!
//! The one call site for protected downloads: resolve who is asking, look up
//! their donor flag, run the quota check, then either start the transfer or
//! show the blocking prompt.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{QuotaError, Result};
use crate::identity::{resolve_identity, ClientIdStore, SessionProvider};
use crate::quota::{Decision, DonorDirectory, Identity, QuotaTracker};

/// Starts the actual file transfer
#[async_trait]
pub trait AssetTransfer: Send + Sync {
    async fn trigger(&self, asset_id: u64) -> Result<()>;
}

/// Shows a blocked decision and offers its remediation route
pub trait PromptSurface: Send + Sync {
    fn show(&self, decision: &Decision);
}

/// Download analytics sink
#[async_trait]
pub trait DownloadLog: Send + Sync {
    async fn record(&self, asset_id: u64, identity: &Identity) -> Result<()>;
}

/// Parse a numeric asset id
pub fn parse_asset_id(asset_ref: &str) -> Result<u64> {
    asset_ref
        .trim()
        .parse::<u64>()
        .map_err(|_| QuotaError::InvalidAsset(asset_ref.to_string()))
}

pub struct DownloadGate {
    tracker: Arc<QuotaTracker>,
    sessions: Arc<dyn SessionProvider>,
    client_ids: Arc<dyn ClientIdStore>,
    donors: Arc<dyn DonorDirectory>,
    transfer: Arc<dyn AssetTransfer>,
    prompt: Arc<dyn PromptSurface>,
    log: Option<Arc<dyn DownloadLog>>,
}

impl DownloadGate {
    pub fn new(
        tracker: Arc<QuotaTracker>,
        sessions: Arc<dyn SessionProvider>,
        client_ids: Arc<dyn ClientIdStore>,
        donors: Arc<dyn DonorDirectory>,
        transfer: Arc<dyn AssetTransfer>,
        prompt: Arc<dyn PromptSurface>,
    ) -> Self {
        DownloadGate {
            tracker,
            sessions,
            client_ids,
            donors,
            transfer,
            prompt,
            log: None,
        }
    }

    pub fn with_download_log(mut self, log: Arc<dyn DownloadLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn tracker(&self) -> &QuotaTracker {
        &self.tracker
    }

    /// Identity of the current requester
    pub async fn identity(&self) -> Result<Identity> {
        let session = self.sessions.current_session().await;
        resolve_identity(session, self.client_ids.as_ref())
    }

    /// Donor flag for an identity; lookup failures count as "not a donor"
    pub async fn donor_flag(&self, identity: &Identity) -> bool {
        match identity {
            Identity::Anonymous(_) => false,
            Identity::Account(account_id) => match self.donors.has_donated(account_id).await {
                Ok(has_donated) => has_donated,
                Err(e) => {
                    warn!(account_id = %account_id, "Donor lookup failed: {}", e);
                    false
                }
            },
        }
    }

    /// Gate one download of `asset_ref`.
    ///
    /// A malformed asset reference fails the attempt before any quota is
    /// touched. A failed transfer is returned as an error, but the download
    /// has already been counted.
    pub async fn request_download(&self, asset_ref: &str) -> Result<Decision> {
        let asset_id = parse_asset_id(asset_ref)?;
        let identity = self.identity().await?;
        let has_donated = self.donor_flag(&identity).await;

        let decision = self.tracker.check_and_consume(&identity, has_donated).await;

        if !decision.is_allowed() {
            self.prompt.show(&decision);
            return Ok(decision);
        }

        self.transfer.trigger(asset_id).await?;
        info!(asset_id, %identity, "Download started");

        if let Some(log) = &self.log {
            if let Err(e) = log.record(asset_id, &identity).await {
                warn!(asset_id, "Failed to record download: {}", e);
            }
        }

        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_asset_id() {
        assert_eq!(parse_asset_id("42").unwrap(), 42);
        assert_eq!(parse_asset_id(" 7 ").unwrap(), 7);
        assert!(matches!(
            parse_asset_id("song-42"),
            Err(QuotaError::InvalidAsset(ref s)) if s == "song-42"
        ));
        assert!(parse_asset_id("-1").is_err());
        assert!(parse_asset_id("").is_err());
    }
}
