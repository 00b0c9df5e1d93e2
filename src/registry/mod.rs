//! Lazily populated directory of per-tenant credential graphs and ciphers.

use crate::access::{AccessContext, ApplicationCredentials, ComponentCredentials};
use crate::cipher::MessageCipher;
use crate::error::{Error, Result};
use crate::platform::AuthorizationInfo;
use crate::store::SimpleCredentialStore;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

mod tenants;


pub use tenants::TenantDirectory;

/// Store of grants and revocations reported at runtime, keyed by appid.
const DELEGATION_STORE: &str = "delegation";

/// Persisted marker of a revoked grant. Overrides a configured delegation.
const REVOKED: &str = "";

/// Resolves the app secret of a tenant.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn secret(&self, appid: &str) -> Result<String>;
}

/// Message key material of a tenant. An empty `encoding_aes_key` means the
/// tenant exchanges messages in plaintext.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AesKey {
    pub token: String,
    pub encoding_aes_key: String,
}

#[async_trait]
pub trait AesKeyProvider: Send + Sync {
    async fn aes_key(&self, appid: &str) -> Result<AesKey>;
}

/// Answers whether an application is delegated, and to which component.
#[async_trait]
pub trait DelegationLookup: Send + Sync {
    /// `None` when the application is not delegated.
    async fn component_appid(&self, appid: &str) -> Result<Option<String>>;

    /// Called when a component is granted access to `appid`.
    async fn record_delegation(&self, _appid: &str, _component_appid: &str) -> Result<()> {
        Ok(())
    }

    /// Called when a grant is revoked.
    async fn remove_delegation(&self, _appid: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Tenants {
    components: HashMap<String, Arc<ComponentCredentials>>,
    applications: HashMap<String, Arc<ApplicationCredentials>>,
    decrypters: HashMap<String, Arc<MessageCipher>>,
}

/// Entry point for callers: maps tenant ids to their credential graphs.
///
/// Graphs are built on first use and kept until [`flash`](Self::flash).
/// The lock is never held across an `.await`; construction re-checks under the
/// write lock so at most one graph is retained per tenant.
///
/// Grants and revocations are written to the context's value storage and
/// take precedence over the [`DelegationLookup`], so they survive a restart.
pub struct CredentialRegistry {
    ctx: AccessContext,
    aes_keys: Arc<dyn AesKeyProvider>,
    delegation: Arc<dyn DelegationLookup>,
    delegations: SimpleCredentialStore,
    tenants: RwLock<Tenants>,
}

impl CredentialRegistry {
    pub fn new(
        ctx: AccessContext,
        aes_keys: Arc<dyn AesKeyProvider>,
        delegation: Arc<dyn DelegationLookup>,
    ) -> Self {
        let delegations = SimpleCredentialStore::new(DELEGATION_STORE, ctx.storage.values.clone());
        Self {
            ctx,
            aes_keys,
            delegation,
            delegations,
            tenants: RwLock::new(Tenants::default()),
        }
    }

    pub fn context(&self) -> &AccessContext {
        &self.ctx
    }

    pub fn component(&self, appid: &str) -> Arc<ComponentCredentials> {
        let cached = self.tenants.read().components.get(appid).cloned();
        if let Some(component) = cached {
            return component;
        }

        let mut tenants = self.tenants.write();
        tenants
            .components
            .entry(appid.to_string())
            .or_insert_with(|| {
                info!(appid = %appid, "Building component credentials");
                Arc::new(ComponentCredentials::new(&self.ctx, appid))
            })
            .clone()
    }

    /// Returns the application graph, building it on first use.
    ///
    /// Without an explicit `component_appid` the recorded grants, then the
    /// delegation lookup, decide whether the application is delegated.
    pub async fn application(
        &self,
        component_appid: Option<&str>,
        appid: &str,
    ) -> Result<Arc<ApplicationCredentials>> {
        let cached = self.tenants.read().applications.get(appid).cloned();
        if let Some(application) = cached {
            return Ok(application);
        }

        let component_appid = match component_appid.filter(|c| !c.is_empty()) {
            Some(c) => Some(c.to_string()),
            None => self.delegated_to(appid).await?,
        };
        let component = component_appid.map(|c| self.component(&c));

        let mut tenants = self.tenants.write();
        let application = tenants
            .applications
            .entry(appid.to_string())
            .or_insert_with(|| {
                info!(
                    appid = %appid,
                    component = ?component.as_ref().map(|c| c.appid()),
                    "Building application credentials"
                );
                Arc::new(ApplicationCredentials::new(&self.ctx, appid, component))
            })
            .clone();
        Ok(application)
    }

    pub async fn app_access_token(&self, appid: &str) -> Result<String> {
        self.application(None, appid).await?.app_access_token().await
    }

    pub async fn app_ticket(&self, appid: &str) -> Result<String> {
        self.application(None, appid).await?.app_ticket().await
    }

    /// Component that `appid` is delegated to.
    ///
    /// Consults the cached graph first, then the recorded grants. Builds
    /// nothing. Fails with [`Error::RequiresDelegatedApplication`] for
    /// components and direct applications.
    pub async fn component_appid_of(&self, appid: &str) -> Result<String> {
        let cached = self.tenants.read().applications.get(appid).cloned();
        let component_appid = match cached {
            Some(application) => application.component().map(|c| c.appid().to_string()),
            None => self.delegated_to(appid).await?,
        };

        component_appid.ok_or_else(|| Error::RequiresDelegatedApplication(appid.to_string()))
    }

    /// Cipher for messages addressed to `appid`.
    ///
    /// Delegated applications use their component's key material. `None`
    /// means the tenant exchanges plaintext messages.
    pub async fn decrypter(&self, appid: &str) -> Result<Option<Arc<MessageCipher>>> {
        let cached = self.tenants.read().decrypters.get(appid).cloned();
        if let Some(cipher) = cached {
            return Ok(Some(cipher));
        }

        let key_owner = self.key_owner(appid).await?;
        let key = self.aes_keys.aes_key(&key_owner).await?;
        if key.encoding_aes_key.is_empty() {
            debug!(appid = %appid, "No message key configured, plaintext mode");
            return Ok(None);
        }

        let cipher = MessageCipher::from_encoding_key(key.token, &key.encoding_aes_key, &key_owner)?;

        let mut tenants = self.tenants.write();
        let cipher = tenants
            .decrypters
            .entry(appid.to_string())
            .or_insert_with(|| Arc::new(cipher))
            .clone();
        Ok(Some(cipher))
    }

    /// Token that signs plain URL signatures for `appid`, taken from the same
    /// key owner as [`decrypter`](Self::decrypter). `None` when no token is
    /// configured.
    pub async fn message_token(&self, appid: &str) -> Result<Option<String>> {
        let key_owner = self.key_owner(appid).await?;
        let key = self.aes_keys.aes_key(&key_owner).await?;
        Ok(Some(key.token).filter(|t| !t.is_empty()))
    }

    /// Evicts every cached graph and cipher of `appid`. Persisted credentials
    /// are kept.
    pub fn flash(&self, appid: &str) {
        let mut tenants = self.tenants.write();
        let evicted = tenants.components.remove(appid).is_some()
            | tenants.applications.remove(appid).is_some()
            | tenants.decrypters.remove(appid).is_some();

        if evicted {
            info!(appid = %appid, "Tenant evicted from registry");
        }
    }

    /// Handles a grant: records the delegation and seeds the app token.
    pub async fn authorize(&self, component_appid: &str, info: &AuthorizationInfo) -> Result<()> {
        let appid = info.authorizer_appid.as_str();
        self.delegations.set(appid, component_appid).await?;
        self.delegation
            .record_delegation(appid, component_appid)
            .await?;

        // A graph built before the grant may be a direct one.
        self.flash(appid);

        self.application(Some(component_appid), appid)
            .await?
            .store_authorization(info)
            .await
    }

    /// Handles a revoked grant.
    ///
    /// With `component_appid` the delegated credentials are dropped even when
    /// no graph is cached and the grant was never recorded in this process.
    pub async fn revoke(&self, component_appid: Option<&str>, appid: &str) -> Result<()> {
        let component_appid = component_appid.filter(|c| !c.is_empty());
        if component_appid.is_some() {
            // A cached graph may be a direct one.
            self.flash(appid);
        }
        let application = self.application(component_appid, appid).await?;
        application.revoke().await?;

        self.delegations.set(appid, REVOKED).await?;
        self.delegation.remove_delegation(appid).await?;
        self.flash(appid);
        Ok(())
    }

    /// Component `appid` is delegated to: a recorded grant or revocation
    /// first, then the lookup.
    async fn delegated_to(&self, appid: &str) -> Result<Option<String>> {
        match self.delegations.get(appid).await? {
            Some(component_appid) => Ok(Some(component_appid).filter(|c| c != REVOKED)),
            None => self.delegation.component_appid(appid).await,
        }
    }

    /// Tenant whose key material serves `appid`: its component when delegated.
    async fn key_owner(&self, appid: &str) -> Result<String> {
        match self.component_appid_of(appid).await {
            Ok(component_appid) => Ok(component_appid),
            Err(Error::RequiresDelegatedApplication(_)) => Ok(appid.to_string()),
            Err(e) => Err(e),
        }
    }
}
