//! In-process remote store, used for tests and embedding.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;

use super::{RemoteError, RemoteLayout, RemoteLayoutStore};
use crate::layout::{Layout, LayoutId};

#[derive(Debug, Default)]
struct State {
    layouts: HashMap<LayoutId, RemoteLayout>,
    last_stamp: Option<DateTime<Utc>>,
}

impl State {
    /// Server timestamps are strictly increasing so every write is observable.
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// A remote layout store held in memory.
///
/// Supports injecting a failure that every subsequent request returns, which
/// stands in for an unreachable service or an expired session.
#[derive(Debug, Default)]
pub struct MemoryRemoteLayoutStore {
    state: RwLock<State>,
    failure: Mutex<Option<RemoteError>>,
    requests: AtomicUsize,
}

impl MemoryRemoteLayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every request fail with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<RemoteError>) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    /// Number of requests received, failed ones included.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Stores a layout directly, as if another client had written it.
    pub async fn insert(&self, layout: &Layout) -> RemoteLayout {
        let mut state = self.state.write().await;
        let updated_at = state.next_stamp();
        let remote = RemoteLayout {
            id: layout.id,
            name: layout.name.clone(),
            data: layout.data.clone(),
            updated_at,
        };
        state.layouts.insert(layout.id, remote.clone());
        remote
    }

    /// Removes a layout directly, as if another client had deleted it.
    pub async fn remove(&self, id: LayoutId) {
        self.state.write().await.layouts.remove(&id);
    }

    fn begin_request(&self) -> Result<(), RemoteError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match &*self.failure.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteLayoutStore for MemoryRemoteLayoutStore {
    async fn list(&self) -> Result<Vec<RemoteLayout>, RemoteError> {
        self.begin_request()?;
        let state = self.state.read().await;
        let mut layouts: Vec<RemoteLayout> = state.layouts.values().cloned().collect();
        layouts.sort_by_key(|l| l.id);
        Ok(layouts)
    }

    async fn get(&self, id: LayoutId) -> Result<Option<RemoteLayout>, RemoteError> {
        self.begin_request()?;
        Ok(self.state.read().await.layouts.get(&id).cloned())
    }

    async fn create(&self, layout: &Layout) -> Result<RemoteLayout, RemoteError> {
        self.begin_request()?;
        let mut state = self.state.write().await;
        if state.layouts.contains_key(&layout.id) {
            return Err(RemoteError::PreconditionFailed(layout.id));
        }
        let updated_at = state.next_stamp();
        let remote = RemoteLayout {
            id: layout.id,
            name: layout.name.clone(),
            data: layout.data.clone(),
            updated_at,
        };
        state.layouts.insert(layout.id, remote.clone());
        Ok(remote)
    }

    async fn update(
        &self,
        layout: &Layout,
        if_unmodified_since: Option<DateTime<Utc>>,
    ) -> Result<RemoteLayout, RemoteError> {
        self.begin_request()?;
        let mut state = self.state.write().await;
        let current = state
            .layouts
            .get(&layout.id)
            .ok_or(RemoteError::NotFound(layout.id))?;

        if let Some(since) = if_unmodified_since {
            if current.updated_at != since {
                return Err(RemoteError::PreconditionFailed(layout.id));
            }
        }

        let updated_at = state.next_stamp();
        let remote = RemoteLayout {
            id: layout.id,
            name: layout.name.clone(),
            data: layout.data.clone(),
            updated_at,
        };
        state.layouts.insert(layout.id, remote.clone());
        Ok(remote)
    }

    async fn delete(
        &self,
        id: LayoutId,
        if_unmodified_since: Option<DateTime<Utc>>,
    ) -> Result<bool, RemoteError> {
        self.begin_request()?;
        let mut state = self.state.write().await;
        let Some(current) = state.layouts.get(&id) else {
            return Ok(false);
        };
        if let Some(since) = if_unmodified_since {
            if current.updated_at != since {
                return Err(RemoteError::PreconditionFailed(id));
            }
        }
        state.layouts.remove(&id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_assigns_increasing_timestamps() {
        let store = MemoryRemoteLayoutStore::new();
        let a = store.create(&Layout::new("a", json!({}))).await.unwrap();
        let b = store.create(&Layout::new("b", json!({}))).await.unwrap();
        assert!(b.updated_at > a.updated_at);
    }

    #[tokio::test]
    async fn test_update_precondition() {
        let store = MemoryRemoteLayoutStore::new();
        let layout = Layout::new("a", json!({}));
        let created = store.create(&layout).await.unwrap();

        let updated = store
            .update(&layout, Some(created.updated_at))
            .await
            .unwrap();

        // Stale precondition is rejected
        let err = store
            .update(&layout, Some(created.updated_at))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::PreconditionFailed(layout.id));

        assert!(store.update(&layout, Some(updated.updated_at)).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_precondition() {
        let store = MemoryRemoteLayoutStore::new();
        let layout = Layout::new("a", json!({}));
        let created = store.create(&layout).await.unwrap();
        let updated = store.update(&layout, None).await.unwrap();

        let err = store
            .delete(layout.id, Some(created.updated_at))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::PreconditionFailed(layout.id));
        assert!(store.get(layout.id).await.unwrap().is_some());

        assert!(store.delete(layout.id, Some(updated.updated_at)).await.unwrap());
        assert!(!store.delete(layout.id, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryRemoteLayoutStore::new();
        store.set_failure(Some(RemoteError::Transport("offline".into())));

        let err = store.list().await.unwrap_err();
        assert_eq!(err.to_string(), "network error: offline");
        assert_eq!(store.request_count(), 1);

        store.set_failure(None);
        assert!(store.list().await.unwrap().is_empty());
    }
}
