//! SQLite-backed storage with credentials sealed at rest.

use super::{Credential, ExpiringStorage, SealingKey, ValueStorage};
use crate::error::{Error, Result};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

/// Persists both plain values and expiring credentials in one database.
///
/// # Schema
/// ```sql
/// CREATE TABLE plain_values (
///     storage_key TEXT PRIMARY KEY,
///     value TEXT NOT NULL,            -- sealed
///     value_nonce TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// CREATE TABLE expiring_credentials (
///     storage_key TEXT PRIMARY KEY,
///     value TEXT NOT NULL,            -- sealed
///     value_nonce TEXT NOT NULL,
///     refresh_token TEXT,             -- sealed (optional)
///     refresh_token_nonce TEXT,
///     expire_at TEXT NOT NULL,        -- RFC 3339
///     updated_at TEXT NOT NULL
/// );
/// ```
///
/// Queries run on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteStorage {
    db: Arc<Database>,
}

struct Database {
    conn: Mutex<Connection>,
    key: SealingKey,
}

impl SqliteStorage {
    /// Opens (or creates) the database and ensures both tables exist.
    pub fn open<P: AsRef<Path>>(db_path: P, key: SealingKey) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open credential database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS plain_values (
                storage_key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                value_nonce TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS expiring_credentials (
                storage_key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                value_nonce TEXT NOT NULL,
                refresh_token TEXT,
                refresh_token_nonce TEXT,
                expire_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create credential tables")?;

        Ok(Self {
            db: Arc::new(Database {
                conn: Mutex::new(conn),
                key,
            }),
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| Error::storage(anyhow::Error::new(e).context("Storage task failed")))?
            .map_err(Error::storage)
    }
}

impl Database {

    fn store_value(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let (sealed, nonce) = self.key.seal(value).context("Failed to seal value")?;
        self.conn
            .lock()
            .execute(
                r#"
                INSERT INTO plain_values (storage_key, value, value_nonce, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(storage_key) DO UPDATE SET
                    value = excluded.value,
                    value_nonce = excluded.value_nonce,
                    updated_at = excluded.updated_at
                "#,
                params![key, sealed, nonce, Utc::now().to_rfc3339()],
            )
            .context("Failed to store value")?;
        Ok(())
    }

    fn read_value(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row: Option<(String, String)> = self
            .conn
            .lock()
            .query_row(
                "SELECT value, value_nonce FROM plain_values WHERE storage_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to read value")?;

        row.map(|(sealed, nonce)| self.key.open(&sealed, &nonce).context("Failed to open value"))
            .transpose()
    }

    fn store_credential(&self, key: &str, credential: &Credential) -> anyhow::Result<()> {
        let (value, value_nonce) = self
            .key
            .seal(&credential.value)
            .context("Failed to seal credential value")?;

        let (refresh_token, refresh_token_nonce) = match &credential.refresh_token {
            Some(token) => {
                let (sealed, nonce) = self
                    .key
                    .seal(token)
                    .context("Failed to seal refresh token")?;
                (Some(sealed), Some(nonce))
            }
            None => (None, None),
        };

        self.conn
            .lock()
            .execute(
                r#"
                INSERT INTO expiring_credentials (
                    storage_key, value, value_nonce,
                    refresh_token, refresh_token_nonce,
                    expire_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(storage_key) DO UPDATE SET
                    value = excluded.value,
                    value_nonce = excluded.value_nonce,
                    refresh_token = excluded.refresh_token,
                    refresh_token_nonce = excluded.refresh_token_nonce,
                    expire_at = excluded.expire_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    key,
                    value,
                    value_nonce,
                    refresh_token,
                    refresh_token_nonce,
                    credential.expire_at.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to store credential")?;
        Ok(())
    }

    fn read_credential(&self, key: &str) -> anyhow::Result<Option<Credential>> {
        type Row = (String, String, Option<String>, Option<String>, String);

        let row: Option<Row> = self
            .conn
            .lock()
            .query_row(
                r#"
                SELECT value, value_nonce, refresh_token, refresh_token_nonce, expire_at
                FROM expiring_credentials
                WHERE storage_key = ?1
                "#,
                params![key],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .context("Failed to read credential")?;

        let Some((sealed, nonce, sealed_refresh, refresh_nonce, expire_at)) = row else {
            return Ok(None);
        };

        let value = self
            .key
            .open(&sealed, &nonce)
            .context("Failed to open credential value")?;
        let refresh_token = match (sealed_refresh, refresh_nonce) {
            (Some(sealed), Some(nonce)) => Some(
                self.key
                    .open(&sealed, &nonce)
                    .context("Failed to open refresh token")?,
            ),
            _ => None,
        };
        let expire_at = DateTime::parse_from_rfc3339(&expire_at)
            .map(|dt| dt.with_timezone(&Utc))
            .context("Failed to parse expire_at timestamp")?;

        Ok(Some(Credential {
            value,
            refresh_token,
            expire_at,
        }))
    }

    fn delete(&self, table: &str, key: &str) -> anyhow::Result<()> {
        self.conn
            .lock()
            .execute(
                &format!("DELETE FROM {} WHERE storage_key = ?1", table),
                params![key],
            )
            .with_context(|| format!("Failed to delete from {}", table))?;
        Ok(())
    }
}

#[async_trait]
impl ValueStorage for SqliteStorage {
    async fn store(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.blocking(move |db| db.store_value(&key, &value)).await
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.blocking(move |db| db.read_value(&key)).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |db| db.delete("plain_values", &key)).await
    }
}

#[async_trait]
impl ExpiringStorage for SqliteStorage {
    async fn store(&self, key: &str, credential: &Credential) -> Result<()> {
        let (key, credential) = (key.to_string(), credential.clone());
        self.blocking(move |db| db.store_credential(&key, &credential))
            .await
    }

    async fn read(&self, key: &str) -> Result<Option<Credential>> {
        let key = key.to_string();
        self.blocking(move |db| db.read_credential(&key)).await
    }

    async fn del(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.blocking(move |db| db.delete("expiring_credentials", &key))
            .await
    }
}
