//! Per-tenant credential graphs.
//!
//! ```text
//! verify ticket ─▶ component access token ─▶ pre-auth code
//!                          │
//!          (or app secret) ▼
//!                   app access token ─▶ app ticket
//!                          │
//!   (component token +) refresh token ─▶ user access token
//! ```
//!
//! A refresh of a child reads its parent through the parent's own store, so a
//! still-valid parent is never refreshed again.

use crate::clock::Clock;
use crate::platform::PlatformApi;
use crate::registry::SecretProvider;
use crate::storage::Storage;
use crate::store::{ExpiringCredentialStore, Refresher, DEFAULT_REFRESH_MARGIN};
use std::sync::Arc;
use std::time::Duration;

mod application;
mod component;

#[cfg(test)]
mod tests;

pub use application::{ApplicationCredentials, OAuthScope};
pub use component::{AuthType, ComponentCredentials};

/// Collaborators shared by every credential graph of a registry.
#[derive(Clone)]
pub struct AccessContext {
    pub storage: Storage,
    pub api: Arc<dyn PlatformApi>,
    pub secrets: Arc<dyn SecretProvider>,
    pub clock: Arc<dyn Clock>,
    pub refresh_margin: Duration,
}

impl AccessContext {
    pub fn new(
        storage: Storage,
        api: Arc<dyn PlatformApi>,
        secrets: Arc<dyn SecretProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            api,
            secrets,
            clock,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    fn expiring_store(
        &self,
        name: &str,
        refresher: impl Refresher + 'static,
    ) -> ExpiringCredentialStore {
        ExpiringCredentialStore::new(
            name,
            self.storage.credentials.clone(),
            self.refresh_margin,
            self.clock.clone(),
            refresher,
        )
    }
}
