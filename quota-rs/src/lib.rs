//! quota-rs: monthly download quotas for the Choir Center song library
//!
//! Decides whether a requester may download a protected song sheet this
//! month, counts the download, and keeps a local cached count in step with
//! the server-side counter.
//!
//! # Rules
//!
//! - Anonymous browsers: 3 downloads per calendar month
//! - Signed-in accounts: 6 downloads per calendar month
//! - Donors: unlimited
//!
//! Months roll over lazily: a new `YYYY-MM` key simply starts at zero.
//! Limits are soft; there is no locking between concurrent checks.
//!
//! # Example
//!
//! ```no_run
//! use quota_rs::quota::{Identity, MemoryCache, MemoryQuotaStore, QuotaTracker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let tracker = QuotaTracker::new(
//!         Arc::new(MemoryQuotaStore::new()),
//!         Arc::new(MemoryCache::new()),
//!     );
//!
//!     let identity = Identity::Account("user-1".to_string());
//!     let decision = tracker.check_and_consume(&identity, false).await;
//!     println!("{}", decision.message());
//! }
//! ```
//!
//! # Modules
//!
//! - [`quota`]: Tracker, policy and storage backends
//! - [`download`]: Download gate tying identity, donors and the tracker together
//! - [`identity`]: Session and anonymous client id resolution
//! - [`api`]: HTTP API serving the server-side store
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling

pub mod api;
pub mod config;
pub mod download;
pub mod error;
pub mod identity;
pub mod logging;
pub mod quota;

// Re-export commonly used types
pub use crate::config::Config;
pub use download::DownloadGate;
pub use error::{QuotaError, Result};
pub use quota::{Decision, Identity, QuotaTracker};
