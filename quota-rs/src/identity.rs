//! Requester identity resolution
//!
//! A signed-in session maps to its account id; otherwise the requester is
//! the anonymous client id persisted in the local profile.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::quota::Identity;

/// Prefix marking generated anonymous client ids
pub const CLIENT_ID_PREFIX: &str = "anon_";

/// Signed-in session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
}

/// Identity/session provider
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current session, `None` when nobody is signed in
    async fn current_session(&self) -> Option<Session>;
}

/// Session fixed at construction
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    session: Option<Session>,
}

impl StaticSession {
    pub fn anonymous() -> Self {
        Self { session: None }
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            session: Some(Session {
                user_id: user_id.into(),
            }),
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_session(&self) -> Option<Session> {
        self.session.clone()
    }
}

/// Holder of the persisted anonymous client id
pub trait ClientIdStore: Send + Sync {
    /// Stored id, generating and persisting one on first use
    fn client_id(&self) -> Result<String>;
}

/// New opaque anonymous client id
pub fn generate_client_id() -> String {
    format!("{}{}", CLIENT_ID_PREFIX, Uuid::new_v4().simple())
}

/// Identity for the current requester
pub fn resolve_identity(session: Option<Session>, client_ids: &dyn ClientIdStore) -> Result<Identity> {
    match session {
        Some(session) => Ok(Identity::Account(session.user_id)),
        None => Ok(Identity::Anonymous(client_ids.client_id()?)),
    }
}
