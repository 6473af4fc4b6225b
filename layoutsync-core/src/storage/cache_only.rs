use async_trait::async_trait;
use std::sync::Arc;

use super::{LayoutStorage, StorageError};
use crate::cache::{CachedLayout, LayoutCache};
use crate::layout::{Layout, LayoutId, LayoutUpdate, NewLayout};

/// Serves layouts straight from the local cache.
///
/// Active when remote layouts are disabled or nobody is signed in. Updates
/// still mark layouts as locally modified so a later reconciliation pushes
/// them; deletes remove the entry outright.
pub struct CacheOnlyLayoutStorage {
    cache: Arc<dyn LayoutCache>,
}

impl CacheOnlyLayoutStorage {
    pub fn new(cache: Arc<dyn LayoutCache>) -> Self {
        Self { cache }
    }

    async fn live_entry(&self, id: LayoutId) -> Result<Option<CachedLayout>, StorageError> {
        Ok(self
            .cache
            .get(id)
            .await?
            .filter(|entry| !entry.sync.locally_deleted))
    }
}

#[async_trait]
impl LayoutStorage for CacheOnlyLayoutStorage {
    async fn list_layouts(&self) -> Result<Vec<Layout>, StorageError> {
        let mut layouts: Vec<Layout> = self
            .cache
            .list()
            .await?
            .into_iter()
            .filter(|entry| !entry.sync.locally_deleted)
            .map(|entry| entry.layout)
            .collect();
        layouts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(layouts)
    }

    async fn get_layout(&self, id: LayoutId) -> Result<Option<Layout>, StorageError> {
        Ok(self.live_entry(id).await?.map(|entry| entry.layout))
    }

    async fn save_new_layout(&self, layout: NewLayout) -> Result<Layout, StorageError> {
        let entry = CachedLayout::local(Layout::new(layout.name, layout.data));
        Ok(self.cache.put(entry).await?.layout)
    }

    async fn update_layout(&self, update: LayoutUpdate) -> Result<Layout, StorageError> {
        let mut entry = self
            .live_entry(update.id)
            .await?
            .ok_or(StorageError::NotFound(update.id))?;

        update.apply_to(&mut entry.layout);
        entry.sync.locally_modified = true;

        Ok(self.cache.put(entry).await?.layout)
    }

    async fn delete_layout(&self, id: LayoutId) -> Result<(), StorageError> {
        self.cache.delete(id).await?;
        Ok(())
    }
}
