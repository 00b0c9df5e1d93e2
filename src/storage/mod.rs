//! Persistence collaborators for the credential caches.
//!
//! The caches never own their data: every read and write goes through one of the
//! two storage traits below, so credentials survive restarts and can be shared by
//! several processes when the backend allows it.
//!
//! # Backends
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  SimpleCredentialStore / Expiring...     │
//! │  - per-instance lock                     │
//! │  - key prefix "<store>:<key>"            │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌──────────────────┐  ┌──────────────────────┐
//! │  MemoryStorage   │  │  SqliteStorage        │
//! │  - DashMap       │  │  - AES-256-GCM at rest│
//! └──────────────────┘  └──────────────────────┘
//! ```

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod encryption;
mod memory;
mod sqlite;

pub use encryption::SealingKey;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// A short-lived credential issued by the remote platform.
///
/// Stored whole and replaced whole; never mutated in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The credential itself (token, ticket, code)
    pub value: String,

    /// Handle used to obtain the next value, when the platform issues one
    pub refresh_token: Option<String>,

    /// Effective expiry: issued lifetime minus the store's refresh margin
    pub expire_at: DateTime<Utc>,
}

impl Credential {
    /// Handle passed to the next refresh: the refresh token, or the value itself
    /// when the platform does not rotate a separate one.
    pub fn refresh_handle(&self) -> &str {
        match self.refresh_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => &self.value,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_at
    }
}

/// Storage for values that do not expire locally.
#[async_trait]
pub trait ValueStorage: Send + Sync {
    async fn store(&self, key: &str, value: &str) -> Result<()>;

    async fn read(&self, key: &str) -> Result<Option<String>>;

    async fn del(&self, key: &str) -> Result<()>;
}

/// Storage for [`Credential`]s.
#[async_trait]
pub trait ExpiringStorage: Send + Sync {
    async fn store(&self, key: &str, credential: &Credential) -> Result<()>;

    async fn read(&self, key: &str) -> Result<Option<Credential>>;

    async fn del(&self, key: &str) -> Result<()>;
}

/// Backends shared by every store of a registry.
#[derive(Clone)]
pub struct Storage {
    pub values: Arc<dyn ValueStorage>,
    pub credentials: Arc<dyn ExpiringStorage>,
}

impl Storage {
    pub fn new(values: Arc<dyn ValueStorage>, credentials: Arc<dyn ExpiringStorage>) -> Self {
        Self {
            values,
            credentials,
        }
    }

    /// Both halves backed by one in-memory map pair.
    pub fn memory() -> Self {
        let backend = Arc::new(MemoryStorage::new());
        Self::new(backend.clone(), backend)
    }

    /// Both halves backed by one SQLite database.
    pub fn sqlite(backend: SqliteStorage) -> Self {
        let backend = Arc::new(backend);
        Self::new(backend.clone(), backend)
    }
}
