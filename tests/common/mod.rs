// Shared setup for the integration tests: a registry wired to a mock platform.
#![allow(dead_code)]

use chrono::Utc;
use mp_access::access::AccessContext;
use mp_access::clock::ManualClock;
use mp_access::config::TenantConfig;
use mp_access::platform::HttpPlatformApi;
use mp_access::registry::{CredentialRegistry, TenantDirectory};
use mp_access::storage::Storage;
use std::sync::Arc;

pub const ENCODING_KEY: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFG";
pub const COMPONENT_TOKEN: &str = "comp-token";

pub struct TestRegistry {
    pub registry: Arc<CredentialRegistry>,
    pub directory: Arc<TenantDirectory>,
    pub clock: Arc<ManualClock>,
}

/// `comp1` with key material, `app1` delegated to it, `app2` direct.
pub fn tenants() -> Vec<TenantConfig> {
    vec![
        TenantConfig {
            appid: "comp1".to_string(),
            secret: Some("component-secret".to_string()),
            token: Some(COMPONENT_TOKEN.to_string()),
            encoding_aes_key: Some(ENCODING_KEY.to_string()),
            component_appid: None,
        },
        TenantConfig {
            appid: "app1".to_string(),
            component_appid: Some("comp1".to_string()),
            ..Default::default()
        },
        TenantConfig {
            appid: "app2".to_string(),
            secret: Some("app2-secret".to_string()),
            ..Default::default()
        },
    ]
}

pub fn registry(api_base_url: &str) -> TestRegistry {
    registry_with(api_base_url, &tenants())
}

pub fn registry_with(api_base_url: &str, tenants: &[TenantConfig]) -> TestRegistry {
    registry_over(api_base_url, tenants, Storage::memory())
}

/// Registry over existing storage, as after a process restart.
pub fn registry_over(api_base_url: &str, tenants: &[TenantConfig], storage: Storage) -> TestRegistry {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let directory = Arc::new(TenantDirectory::from_config(tenants));
    let api = Arc::new(HttpPlatformApi::new(api_base_url));

    let ctx = AccessContext::new(storage, api, directory.clone(), clock.clone());
    let registry = Arc::new(CredentialRegistry::new(
        ctx,
        directory.clone(),
        directory.clone(),
    ));

    TestRegistry {
        registry,
        directory,
        clock,
    }
}
