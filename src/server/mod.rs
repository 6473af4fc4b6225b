//! Server-side modules for the layout sync server.

pub mod config;
pub mod routes;
pub mod storage;

pub use config::{ApiKeyStore, AuthUser, ServerConfig};
pub use routes::{router, AppState};
pub use storage::{LayoutContent, LayoutFileStore, LayoutStoreError};
