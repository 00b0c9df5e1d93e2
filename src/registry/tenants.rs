use super::{AesKey, AesKeyProvider, DelegationLookup, SecretProvider};
use crate::config::TenantConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

/// In-process tenant directory seeded from configuration.
///
/// Serves secrets and message keys as configured. Delegations start from the
/// configured `component_appid` values and follow grants and revocations
/// reported at runtime.
#[derive(Debug, Default)]
pub struct TenantDirectory {
    tenants: DashMap<String, TenantConfig>,
    delegations: DashMap<String, String>,
}

impl TenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(tenants: &[TenantConfig]) -> Self {
        let directory = Self::new();
        for tenant in tenants {
            directory.insert(tenant.clone());
        }
        directory
    }

    pub fn insert(&self, tenant: TenantConfig) {
        if let Some(component_appid) = tenant.component_appid.as_deref().filter(|c| !c.is_empty()) {
            self.delegations
                .insert(tenant.appid.clone(), component_appid.to_string());
        }
        self.tenants.insert(tenant.appid.clone(), tenant);
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

#[async_trait]
impl SecretProvider for TenantDirectory {
    async fn secret(&self, appid: &str) -> Result<String> {
        self.tenants
            .get(appid)
            .and_then(|t| t.secret.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Provider(format!("no secret configured for {}", appid)))
    }
}

#[async_trait]
impl AesKeyProvider for TenantDirectory {
    async fn aes_key(&self, appid: &str) -> Result<AesKey> {
        let tenant = self
            .tenants
            .get(appid)
            .ok_or_else(|| Error::Provider(format!("unknown tenant {}", appid)))?;

        Ok(AesKey {
            token: tenant.token.clone().unwrap_or_default(),
            encoding_aes_key: tenant.encoding_aes_key.clone().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl DelegationLookup for TenantDirectory {
    async fn component_appid(&self, appid: &str) -> Result<Option<String>> {
        Ok(self.delegations.get(appid).map(|c| c.value().clone()))
    }

    async fn record_delegation(&self, appid: &str, component_appid: &str) -> Result<()> {
        info!(appid = %appid, component = %component_appid, "Delegation recorded");
        self.delegations
            .insert(appid.to_string(), component_appid.to_string());
        Ok(())
    }

    async fn remove_delegation(&self, appid: &str) -> Result<()> {
        if self.delegations.remove(appid).is_some() {
            info!(appid = %appid, "Delegation removed");
        }
        Ok(())
    }
}
