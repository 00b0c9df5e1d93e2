use anyhow::{Context, Result};
use mp_access::access::AccessContext;
use mp_access::clock::TickingClock;
use mp_access::config::{load_config, AccessConfig};
use mp_access::platform::HttpPlatformApi;
use mp_access::registry::{CredentialRegistry, TenantDirectory};
use mp_access::storage::{SealingKey, SqliteStorage, Storage};
use mp_access::webhook::{create_router, WebhookState};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mp_access=info".into()),
        )
        .init();

    info!("mp-access starting...");

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MP_ACCESS_CONFIG").ok())
        .unwrap_or_else(|| "mp-access.toml".to_string());

    let config = if Path::new(&config_path).exists() {
        load_config(&config_path)?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        AccessConfig::default()
    };

    info!(
        listen_addr = %config.server.listen_addr,
        api_base_url = %config.platform.api_base_url,
        refresh_margin_seconds = config.cache.refresh_margin_seconds,
        tenants = config.tenants.len(),
        "Configuration loaded"
    );

    let storage = match std::env::var("MP_ACCESS_ENCRYPTION_KEY") {
        Ok(key) => {
            let key = SealingKey::from_base64(&key)
                .context("MP_ACCESS_ENCRYPTION_KEY must be a base64-encoded 32-byte key")?;
            let backend = SqliteStorage::open(&config.storage.database_path, key)
                .context("Failed to initialize credential storage")?;
            info!(path = %config.storage.database_path, "Credential storage initialized");
            Storage::sqlite(backend)
        }
        Err(_) => {
            warn!("MP_ACCESS_ENCRYPTION_KEY not set, credentials are kept in memory only");
            Storage::memory()
        }
    };

    let clock = TickingClock::start(config.cache.clock_tick());
    let api = Arc::new(HttpPlatformApi::new(config.platform.api_base_url.clone()));
    let directory = Arc::new(TenantDirectory::from_config(&config.tenants));

    let ctx = AccessContext::new(storage, api, directory.clone(), clock)
        .with_refresh_margin(config.cache.refresh_margin());
    let registry = Arc::new(CredentialRegistry::new(
        ctx,
        directory.clone(),
        directory,
    ));

    let router = create_router(WebhookState { registry });
    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .context("Failed to bind webhook listener")?;
    info!(addr = %config.server.listen_addr, "Webhook listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Webhook server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("mp-access stopped");

    Ok(())
}
