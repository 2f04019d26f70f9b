/// Monthly download quotas
///
/// This module provides:
/// - The quota tracker (check, consume, reconcile)
/// - Cap, reconciliation and remediation policy
/// - Local cache, server store and donor lookup backends

pub mod cache;
pub mod clock;
pub mod donor;
pub mod policy;
pub mod remote;
pub mod sqlite;
pub mod store;
pub mod tracker;
pub mod types;

pub use cache::{CacheEntry, LocalCache, MemoryCache, ProfileCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use donor::{DonorDirectory, MemoryDonorDirectory};
pub use policy::{QuotaLimits, ReconcilePolicy, RemediationRoutes};
pub use remote::{HttpDonorDirectory, HttpQuotaStore};
pub use sqlite::{open_pool, SqliteDonorDirectory, SqliteQuotaStore};
pub use store::{MemoryQuotaStore, QuotaStore};
pub use tracker::QuotaTracker;
pub use types::{Decision, DonorStatus, Identity, Lookup, Period, QuotaRecord, QuotaUsage};
