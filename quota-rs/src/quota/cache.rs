//! Client-side download counter cache
//!
//! A best-effort mirror of the server count, one entry per period, so a
//! download can be checked before the server answers. Two backends:
//! - [`MemoryCache`]: process-local, for tests and short-lived sessions
//! - [`ProfileCache`]: JSON file standing in for a browser profile; it also
//!   owns the persisted anonymous client id

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::types::Period;
use crate::error::Result;
use crate::identity::{generate_client_id, ClientIdStore};

/// Cached count for one period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Downloads counted locally
    pub count: u32,
    /// First day of the period this entry was last written for
    pub reset_marker: Option<NaiveDate>,
}

impl CacheEntry {
    /// Whether the entry belongs to the given period
    pub fn is_current(&self, period: &Period) -> bool {
        self.reset_marker == Some(period.first_day())
    }
}

/// Local counter cache, injected into the tracker
pub trait LocalCache: Send + Sync {
    /// Entry for the period; empty entry when nothing is stored
    fn get(&self, period: &Period) -> CacheEntry;

    /// Store a count for the period, stamping it with the period's reset marker
    fn set(&self, period: &Period, count: u32) -> Result<()>;
}

/// In-memory cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    client_id: Mutex<Option<String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry as-is, bypassing the reset marker stamping
    pub fn insert_raw(&self, period: &Period, entry: CacheEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(period.key(), entry);
    }

    /// Drop everything, like a user clearing site data
    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, period: &Period) -> CacheEntry {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&period.key())
            .copied()
            .unwrap_or_default()
    }

    fn set(&self, period: &Period, count: u32) -> Result<()> {
        self.insert_raw(
            period,
            CacheEntry {
                count,
                reset_marker: Some(period.first_day()),
            },
        );
        Ok(())
    }
}

impl ClientIdStore for MemoryCache {
    fn client_id(&self) -> Result<String> {
        let mut client_id = self.client_id.lock().unwrap_or_else(|e| e.into_inner());
        Ok(client_id.get_or_insert_with(generate_client_id).clone())
    }
}

/// Persisted profile contents
#[derive(Debug, Default, Serialize, Deserialize)]
struct ClientProfile {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    downloads: BTreeMap<String, CacheEntry>,
}

/// File-backed cache holding one client profile.
///
/// Every `set` rewrites the file synchronously while holding the profile
/// lock. It is meant for the single-user CLI; a server runtime should use
/// [`MemoryCache`] or move writes onto `tokio::task::spawn_blocking`.
#[derive(Debug)]
pub struct ProfileCache {
    path: PathBuf,
    profile: Mutex<ClientProfile>,
}

impl ProfileCache {
    /// Open a profile file, starting empty if it does not exist.
    /// An unreadable file is discarded, as a browser would with corrupt storage.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let profile = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), "Discarding unreadable profile: {}", e);
                ClientProfile::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No profile yet, starting empty");
                ClientProfile::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ProfileCache {
            path,
            profile: Mutex::new(profile),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, profile: &ClientProfile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(profile)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl LocalCache for ProfileCache {
    fn get(&self, period: &Period) -> CacheEntry {
        self.profile
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .downloads
            .get(&period.key())
            .copied()
            .unwrap_or_default()
    }

    fn set(&self, period: &Period, count: u32) -> Result<()> {
        let mut profile = self.profile.lock().unwrap_or_else(|e| e.into_inner());
        let key = period.key();
        // Earlier periods can never be read again
        profile.downloads.retain(|stored, _| *stored >= key);
        profile.downloads.insert(
            key,
            CacheEntry {
                count,
                reset_marker: Some(period.first_day()),
            },
        );
        self.save(&profile)
    }
}

impl ClientIdStore for ProfileCache {
    fn client_id(&self) -> Result<String> {
        let mut profile = self.profile.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(id) = &profile.client_id {
            return Ok(id.clone());
        }

        let id = generate_client_id();
        profile.client_id = Some(id.clone());
        // The id stays usable for this run even if it cannot be persisted
        if let Err(e) = self.save(&profile) {
            warn!(path = %self.path.display(), "Failed to persist client id: {}", e);
        }
        Ok(id)
    }
}
