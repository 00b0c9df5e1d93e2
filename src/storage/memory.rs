use super::{Credential, ExpiringStorage, ValueStorage};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory storage. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: DashMap<String, String>,
    credentials: DashMap<String, Credential>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ValueStorage for MemoryStorage {
    async fn store(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

#[async_trait]
impl ExpiringStorage for MemoryStorage {
    async fn store(&self, key: &str, credential: &Credential) -> Result<()> {
        self.credentials.insert(key.to_string(), credential.clone());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Credential>> {
        Ok(self.credentials.get(key).map(|c| c.value().clone()))
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.credentials.remove(key);
        Ok(())
    }
}
