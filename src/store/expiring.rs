use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::storage::{Credential, ExpiringStorage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Subtracted from every issued lifetime unless configured otherwise.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(20 * 60);

/// Result of one refresh call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refreshed {
    pub value: String,
    /// New refresh handle. `None` (or empty) means the next refresh reuses `value`.
    pub refresh_token: Option<String>,
    /// Lifetime declared by the platform, in seconds
    pub expires_in: i64,
}

impl Refreshed {
    pub fn new(value: impl Into<String>, expires_in: i64) -> Self {
        Self {
            value: value.into(),
            refresh_token: None,
            expires_in,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }
}

/// Obtains a fresh credential from the remote platform.
#[async_trait]
pub trait Refresher: Send + Sync {
    /// `refresh_token` is the stored refresh handle, or empty on a cold cache.
    async fn refresh(&self, key: &str, refresh_token: &str) -> Result<Refreshed>;
}

/// Key-addressed cache of expiring credentials.
pub struct ExpiringCredentialStore {
    name: String,
    storage: Arc<dyn ExpiringStorage>,
    refresher: Box<dyn Refresher>,
    margin: chrono::Duration,
    clock: Arc<dyn Clock>,
    lock: Mutex<()>,
}

impl ExpiringCredentialStore {
    pub fn new(
        name: impl Into<String>,
        storage: Arc<dyn ExpiringStorage>,
        margin: Duration,
        clock: Arc<dyn Clock>,
        refresher: impl Refresher + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            storage,
            refresher: Box::new(refresher),
            margin: chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero()),
            clock,
            lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the cached value, refreshing it first when missing or expired.
    pub async fn get(&self, key: &str) -> Result<String> {
        self.load(key, false).await
    }

    /// Refreshes unconditionally and returns the new value.
    pub async fn refresh(&self, key: &str) -> Result<String> {
        self.load(key, true).await
    }

    /// Stores a credential obtained outside a refresh cycle.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        refresh_token: Option<&str>,
        expires_in: i64,
    ) -> Result<()> {
        let _guard = self.lock.lock().await;
        let credential = Credential {
            value: value.to_string(),
            refresh_token: refresh_token.filter(|t| !t.is_empty()).map(str::to_string),
            expire_at: self.effective_expiry(self.clock.now(), expires_in)?,
        };
        self.storage.store(&self.storage_key(key), &credential).await
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.storage.del(&self.storage_key(key)).await
    }

    async fn load(&self, key: &str, force: bool) -> Result<String> {
        let _guard = self.lock.lock().await;
        let storage_key = self.storage_key(key);

        let current = self.storage.read(&storage_key).await?;
        let now = self.clock.now();

        if let Some(credential) = &current {
            if !force && !credential.is_expired_at(now) {
                debug!(store = %self.name, key = %key, "Credential cache hit");
                return Ok(credential.value.clone());
            }
        }

        let handle = current
            .as_ref()
            .map(Credential::refresh_handle)
            .unwrap_or_default();

        debug!(
            store = %self.name,
            key = %key,
            forced = force,
            cold = current.is_none(),
            "Refreshing credential"
        );

        let result = self.refresher.refresh(key, handle).await.and_then(|refreshed| {
            let expire_at = self.effective_expiry(now, refreshed.expires_in)?;
            Ok((refreshed, expire_at))
        });
        let (refreshed, expire_at) = match result {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(store = %self.name, key = %key, error = %e, "Credential refresh failed");
                return Err(Error::Refresh {
                    store: self.name.clone(),
                    source: Box::new(e),
                });
            }
        };

        let credential = Credential {
            value: refreshed.value,
            refresh_token: refreshed.refresh_token.filter(|t| !t.is_empty()),
            expire_at,
        };
        self.storage.store(&storage_key, &credential).await?;

        info!(
            store = %self.name,
            key = %key,
            expire_at = %credential.expire_at,
            "Credential refreshed"
        );

        Ok(credential.value)
    }

    /// `now + expires_in - margin`. Lifetimes outside the clock's range are
    /// rejected rather than stored.
    fn effective_expiry(
        &self,
        now: chrono::DateTime<chrono::Utc>,
        expires_in: i64,
    ) -> Result<chrono::DateTime<chrono::Utc>> {
        chrono::Duration::try_seconds(expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .and_then(|expire_at| expire_at.checked_sub_signed(self.margin))
            .ok_or(Error::InvalidLifetime(expires_in))
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}:{}", self.name, key)
    }
}
