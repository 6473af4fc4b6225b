//! SQLite-backed layout cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use super::{CacheError, CachedLayout, LayoutCache, SyncState};
use crate::layout::{Layout, LayoutId};

type LayoutRow = (String, String, String, String, Option<String>, bool, bool);

/// Layout cache persisted in a local SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteLayoutCache {
    pool: SqlitePool,
}

impl SqliteLayoutCache {
    /// Opens (creating if needed) the cache database at `path` and runs migrations.
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Wraps an existing pool, running migrations on it.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, CacheError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    fn from_row(row: LayoutRow) -> Result<CachedLayout, CacheError> {
        let (id, name, data, updated_at, baseline, locally_modified, locally_deleted) = row;

        let layout_id = LayoutId::from_str(&id).map_err(|e| CacheError::Corrupt {
            id: id.clone(),
            reason: e.to_string(),
        })?;

        Ok(CachedLayout {
            layout: Layout {
                id: layout_id,
                name,
                data: serde_json::from_str(&data)?,
                updated_at: parse_timestamp(&id, &updated_at)?,
            },
            sync: SyncState {
                baseline: baseline.map(|b| parse_timestamp(&id, &b)).transpose()?,
                locally_modified,
                locally_deleted,
            },
        })
    }
}

fn parse_timestamp(id: &str, value: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::Corrupt {
            id: id.to_string(),
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

#[async_trait]
impl LayoutCache for SqliteLayoutCache {
    async fn list(&self) -> Result<Vec<CachedLayout>, CacheError> {
        let rows: Vec<LayoutRow> = sqlx::query_as(
            "SELECT id, name, data, updated_at, baseline, locally_modified, locally_deleted
             FROM layouts ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::from_row).collect()
    }

    async fn get(&self, id: LayoutId) -> Result<Option<CachedLayout>, CacheError> {
        let row: Option<LayoutRow> = sqlx::query_as(
            "SELECT id, name, data, updated_at, baseline, locally_modified, locally_deleted
             FROM layouts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::from_row).transpose()
    }

    async fn put(&self, entry: CachedLayout) -> Result<CachedLayout, CacheError> {
        let data = serde_json::to_string(&entry.layout.data)?;

        sqlx::query(
            "INSERT INTO layouts (id, name, data, updated_at, baseline, locally_modified, locally_deleted)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                data = excluded.data,
                updated_at = excluded.updated_at,
                baseline = excluded.baseline,
                locally_modified = excluded.locally_modified,
                locally_deleted = excluded.locally_deleted",
        )
        .bind(entry.layout.id.to_string())
        .bind(&entry.layout.name)
        .bind(data)
        .bind(entry.layout.updated_at.to_rfc3339())
        .bind(entry.sync.baseline.map(|b| b.to_rfc3339()))
        .bind(entry.sync.locally_modified)
        .bind(entry.sync.locally_deleted)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn delete(&self, id: LayoutId) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM layouts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn setup() -> (SqliteLayoutCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = SqliteLayoutCache::open(&temp_dir.path().join("nested").join("cache.db"))
            .await
            .unwrap();
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_open_creates_parent_directory() {
        let (_cache, temp) = setup().await;
        assert!(temp.path().join("nested").join("cache.db").exists());
    }

    #[tokio::test]
    async fn test_put_and_get_preserves_sync_state() {
        let (cache, _temp) = setup().await;
        let baseline = Utc::now();
        let entry = CachedLayout {
            layout: Layout::new("Plots", json!({"panels": ["plot", "map"]})),
            sync: SyncState {
                baseline: Some(baseline),
                locally_modified: true,
                locally_deleted: false,
            },
        };

        cache.put(entry.clone()).await.unwrap();
        let loaded = cache.get(entry.id()).await.unwrap().unwrap();

        assert_eq!(loaded.layout.name, "Plots");
        assert_eq!(loaded.layout.data, json!({"panels": ["plot", "map"]}));
        assert!(loaded.sync.locally_modified);
        assert_eq!(
            loaded.sync.baseline.map(|b| b.timestamp_micros()),
            Some(baseline.timestamp_micros())
        );
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let (cache, _temp) = setup().await;
        let mut entry = CachedLayout::local(Layout::new("Before", json!(1)));
        cache.put(entry.clone()).await.unwrap();

        entry.layout.name = "After".to_string();
        entry.sync.locally_deleted = true;
        cache.put(entry.clone()).await.unwrap();

        let all = cache.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].layout.name, "After");
        assert!(all[0].sync.locally_deleted);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let (cache, _temp) = setup().await;
        assert!(cache.get(LayoutId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let (cache, _temp) = setup().await;
        let entry = CachedLayout::local(Layout::new("Gone", json!({})));
        cache.put(entry.clone()).await.unwrap();

        cache.delete(entry.id()).await.unwrap();
        assert!(cache.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.db");
        let entry = CachedLayout::local(Layout::new("Persisted", json!({"a": 1})));

        {
            let cache = SqliteLayoutCache::open(&path).await.unwrap();
            cache.put(entry.clone()).await.unwrap();
        }

        let cache = SqliteLayoutCache::open(&path).await.unwrap();
        let loaded = cache.get(entry.id()).await.unwrap().unwrap();
        assert_eq!(loaded.layout.name, "Persisted");
    }
}
