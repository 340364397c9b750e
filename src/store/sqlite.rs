use super::Storage;
use crate::db;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::serde_json::{self, Value};
use sqlx::sqlite::SqlitePool;

/// Storage in a single `kv` table of a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `db_location`
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file or table cannot be created
    pub async fn open(db_location: &str) -> Result<Self> {
        let pool = db::init(db_location).await?;
        db::create_table(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((text,)) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    async fn store_batch(&self, writes: Vec<(String, Value)>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in writes {
            sqlx::query(
                "INSERT INTO kv (key, value) VALUES (?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}
