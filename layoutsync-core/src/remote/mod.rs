//! Remote layout store: the service of record for layouts.
//!
//! All operations are authenticated. They fail with [`RemoteError::Unauthorized`]
//! when the session is invalid and [`RemoteError::Transport`] when the service
//! cannot be reached. Timeouts are the store's concern, not its callers'.

mod http;
mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::{Layout, LayoutId};

pub use http::{
    check_server, CreateLayoutRequest, DeleteLayoutQuery, HttpRemoteLayoutStore,
    UpdateLayoutRequest,
};
pub use memory::MemoryRemoteLayoutStore;

/// Errors returned by a remote layout store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("not authorized")]
    Unauthorized,

    #[error("network error: {0}")]
    Transport(String),

    #[error("layout {0} was modified on the server")]
    PreconditionFailed(LayoutId),

    #[error("layout {0} not found on the server")]
    NotFound(LayoutId),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("invalid server response: {0}")]
    Decode(String),
}

/// A layout as stored by the remote service. `updated_at` is server-assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLayout {
    pub id: LayoutId,
    pub name: String,
    pub data: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl From<RemoteLayout> for Layout {
    fn from(remote: RemoteLayout) -> Self {
        Layout {
            id: remote.id,
            name: remote.name,
            data: remote.data,
            updated_at: remote.updated_at,
        }
    }
}

/// Authenticated CRUD of layout documents against the remote service.
#[async_trait]
pub trait RemoteLayoutStore: Send + Sync {
    async fn list(&self) -> Result<Vec<RemoteLayout>, RemoteError>;

    async fn get(&self, id: LayoutId) -> Result<Option<RemoteLayout>, RemoteError>;

    /// Creates the layout under its own ID.
    async fn create(&self, layout: &Layout) -> Result<RemoteLayout, RemoteError>;

    /// Replaces name and data of an existing layout.
    ///
    /// Fails with [`RemoteError::PreconditionFailed`] when the remote copy
    /// changed after `if_unmodified_since`.
    async fn update(
        &self,
        layout: &Layout,
        if_unmodified_since: Option<DateTime<Utc>>,
    ) -> Result<RemoteLayout, RemoteError>;

    /// Deletes a layout. Returns false if it did not exist.
    ///
    /// Fails with [`RemoteError::PreconditionFailed`] when the remote copy
    /// changed after `if_unmodified_since`.
    async fn delete(
        &self,
        id: LayoutId,
        if_unmodified_since: Option<DateTime<Utc>>,
    ) -> Result<bool, RemoteError>;
}
