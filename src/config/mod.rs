use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Complete mp-access configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub tenants: Vec<TenantConfig>,
}

/// Webhook listener
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Credential persistence. The at-rest key comes from `MP_ACCESS_ENCRYPTION_KEY`.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "mp-access.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Subtracted from every issued lifetime (seconds)
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_seconds: u64,
    /// Resolution of the expiry clock (seconds)
    #[serde(default = "default_clock_tick")]
    pub clock_tick_seconds: u64,
}

fn default_refresh_margin() -> u64 {
    1200
}

fn default_clock_tick() -> u64 {
    60
}

impl CacheConfig {
    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_seconds)
    }

    pub fn clock_tick(&self) -> Duration {
        Duration::from_secs(self.clock_tick_seconds.max(1))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_margin_seconds: default_refresh_margin(),
            clock_tick_seconds: default_clock_tick(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

fn default_api_base_url() -> String {
    "https://api.weixin.qq.com".to_string()
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
        }
    }
}

/// One statically configured tenant (component, direct or delegated application).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantConfig {
    pub appid: String,
    #[serde(default)]
    pub secret: Option<String>,
    /// Message signing token
    #[serde(default)]
    pub token: Option<String>,
    /// 43-character EncodingAESKey; absent for plaintext tenants
    #[serde(default)]
    pub encoding_aes_key: Option<String>,
    /// Set for applications delegated to a component
    #[serde(default)]
    pub component_appid: Option<String>,
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<AccessConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AccessConfig = toml::from_str(&contents).context("Failed to parse config")?;
    Ok(config)
}
