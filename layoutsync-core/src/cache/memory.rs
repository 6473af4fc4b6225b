use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{CacheError, CachedLayout, LayoutCache};
use crate::layout::LayoutId;

/// Ephemeral in-memory cache. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryLayoutCache {
    entries: RwLock<HashMap<LayoutId, CachedLayout>>,
}

impl MemoryLayoutCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LayoutCache for MemoryLayoutCache {
    async fn list(&self) -> Result<Vec<CachedLayout>, CacheError> {
        let entries = self.entries.read().await;
        let mut layouts: Vec<CachedLayout> = entries.values().cloned().collect();
        layouts.sort_by(|a, b| a.layout.name.cmp(&b.layout.name));
        Ok(layouts)
    }

    async fn get(&self, id: LayoutId) -> Result<Option<CachedLayout>, CacheError> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn put(&self, entry: CachedLayout) -> Result<CachedLayout, CacheError> {
        self.entries.write().await.insert(entry.id(), entry.clone());
        Ok(entry)
    }

    async fn delete(&self, id: LayoutId) -> Result<(), CacheError> {
        self.entries.write().await.remove(&id);
        Ok(())
    }
}
