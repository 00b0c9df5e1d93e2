use crate::error::Result;
use crate::storage::ValueStorage;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cache of values whose freshness is managed by the remote platform,
/// such as the verify ticket it pushes every few minutes.
pub struct SimpleCredentialStore {
    name: String,
    storage: Arc<dyn ValueStorage>,
    lock: Mutex<()>,
}

impl SimpleCredentialStore {
    pub fn new(name: impl Into<String>, storage: Arc<dyn ValueStorage>) -> Self {
        Self {
            name: name.into(),
            storage,
            lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        self.storage.read(&self.storage_key(key)).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.storage.store(&self.storage_key(key), value).await
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.storage.del(&self.storage_key(key)).await
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}:{}", self.name, key)
    }
}
