use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::LocalCache;
use super::clock::{Clock, SystemClock};
use super::policy::{self, QuotaLimits, ReconcilePolicy, RemediationRoutes};
use super::store::QuotaStore;
use super::types::{Decision, Identity, Lookup, Period, QuotaRecord, QuotaUsage};

/// Monthly download quota tracker
///
/// Gates downloads on a per-identity, per-month counter kept in two places:
/// the injected local cache and the server store. Every store failure
/// degrades to a best-effort count instead of failing the check.
pub struct QuotaTracker {
    store: Arc<dyn QuotaStore>,
    cache: Arc<dyn LocalCache>,
    clock: Arc<dyn Clock>,
    limits: QuotaLimits,
    reconcile: ReconcilePolicy,
    routes: RemediationRoutes,
}

impl QuotaTracker {
    /// Create a tracker with default caps, the `Max` policy and the wall clock
    pub fn new(store: Arc<dyn QuotaStore>, cache: Arc<dyn LocalCache>) -> Self {
        QuotaTracker {
            store,
            cache,
            clock: Arc::new(SystemClock),
            limits: QuotaLimits::default(),
            reconcile: ReconcilePolicy::default(),
            routes: RemediationRoutes::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_limits(mut self, limits: QuotaLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_reconcile_policy(mut self, reconcile: ReconcilePolicy) -> Self {
        self.reconcile = reconcile;
        self
    }

    pub fn with_routes(mut self, routes: RemediationRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn limits(&self) -> &QuotaLimits {
        &self.limits
    }

    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        self.reconcile
    }

    pub fn current_period(&self) -> Period {
        self.clock.period()
    }

    /// Check the quota and, if there is room, count one download.
    ///
    /// Read-then-write with no lock: two concurrent calls for the same
    /// identity can both pass on the same pre-increment count.
    pub async fn check_and_consume(&self, identity: &Identity, has_donated: bool) -> Decision {
        let period = self.current_period();
        let pre_count = self.reconciled_count(identity, &period).await;
        let cap = self.limits.cap_for(identity, has_donated);

        if let Some(cap) = cap {
            if pre_count >= cap {
                info!(%identity, period = %period, used = pre_count, cap, "Download blocked");
                return policy::blocked(identity, pre_count, cap, &self.routes);
            }
        }

        let used = pre_count.saturating_add(1);

        if let Err(e) = self.cache.set(&period, used) {
            warn!(%identity, period = %period, "Failed to update local download count: {}", e);
        }

        // The download is already granted; a failed upsert only loses the server copy
        let record = QuotaRecord::new(identity, period, used);
        if let Err(e) = self.store.upsert(&record).await {
            warn!(%identity, period = %period, used, "Failed to persist download count: {}", e);
        }

        info!(%identity, period = %period, used, cap = ?cap, "Download allowed");
        policy::allowed(used, cap)
    }

    /// Current usage without consuming anything
    pub async fn status(&self, identity: &Identity, has_donated: bool) -> QuotaUsage {
        let period = self.current_period();
        QuotaUsage {
            used: self.reconciled_count(identity, &period).await,
            cap: self.limits.cap_for(identity, has_donated),
        }
    }

    /// Page-load sync: write the reconciled count back into the local cache
    pub async fn refresh(&self, identity: &Identity) -> u32 {
        let period = self.current_period();
        let count = self.reconciled_count(identity, &period).await;

        if let Err(e) = self.cache.set(&period, count) {
            warn!(%identity, period = %period, "Failed to refresh local download count: {}", e);
        }
        count
    }

    /// Local count for the period, zeroing the cache first if its reset
    /// marker belongs to another period
    fn local_count(&self, period: &Period) -> u32 {
        let entry = self.cache.get(period);
        if entry.is_current(period) {
            return entry.count;
        }

        debug!(period = %period, stale_marker = ?entry.reset_marker, "Resetting local download count");
        if let Err(e) = self.cache.set(period, 0) {
            warn!(period = %period, "Failed to reset local download count: {}", e);
        }
        0
    }

    async fn server_count(&self, identity: &Identity, period: &Period) -> Option<u32> {
        match self.store.lookup(identity, period).await {
            Lookup::Found(record) => Some(record.count),
            Lookup::NotFound => None,
            Lookup::Failed(reason) => {
                warn!(%identity, period = %period, "Quota lookup failed, using local count: {}", reason);
                None
            }
        }
    }

    async fn reconciled_count(&self, identity: &Identity, period: &Period) -> u32 {
        let local = self.local_count(period);
        let server = self.server_count(identity, period).await;
        let count = self.reconcile.reconcile(local, server);

        debug!(%identity, period = %period, local, server = ?server, count, "Reconciled download count");
        count
    }
}
