//! Ephemeral TTL'd flag store.
//!
//! The scheduler reads `needs_update:{skill_id}` flags set by the visit
//! path; expired flags are invisible to readers and lazily purged.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl_secs`.
    async fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()>;

    /// Read an unexpired flag.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// List unexpired keys starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete a flag. Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory flag store for tests.
pub struct MemoryFlagStore {
    flags: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self {
            flags: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryFlagStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()> {
        let expires = Utc::now() + chrono::Duration::seconds(ttl_secs);
        let mut flags = self.flags.write().unwrap();
        flags.insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let flags = self.flags.read().unwrap();
        Ok(flags
            .get(key)
            .filter(|(_, expires)| *expires > Utc::now())
            .map(|(value, _)| value.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Utc::now();
        let flags = self.flags.read().unwrap();
        Ok(flags
            .iter()
            .filter(|(k, (_, expires))| k.starts_with(prefix) && *expires > now)
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut flags = self.flags.write().unwrap();
        flags.remove(key);
        Ok(())
    }
}

/// SQLite-backed flag store sharing the catalog database.
pub struct SqliteFlagStore {
    pool: SqlitePool,
}

impl SqliteFlagStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlagStore for SqliteFlagStore {
    async fn set(&self, key: &str, value: &str, ttl_secs: i64) -> Result<()> {
        let expires = Utc::now().timestamp() + ttl_secs;
        sqlx::query(
            "INSERT INTO flags (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<String> =
            sqlx::query_scalar("SELECT value FROM flags WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(Utc::now().timestamp())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Utc::now().timestamp();
        // Purge expired rows while we are here
        sqlx::query("DELETE FROM flags WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM flags WHERE key LIKE ? ESCAPE '\\' AND expires_at > ?",
        )
        .bind(pattern)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM flags WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
