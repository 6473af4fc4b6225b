//! Layout Sync Server
//!
//! Stores layouts per user so clients with remote layouts enabled can
//! reconcile their local caches against it.
//!
//! # Configuration
//!
//! Environment variables:
//! - `LAYOUTSYNC_PORT`: Port to listen on (default: 8080)
//! - `LAYOUTSYNC_DATA_DIR`: Directory to store layouts (default: ~/.local/share/layoutsync-server)
//! - `LAYOUTSYNC_CONFIG`: Path to config file (default: ~/.config/layoutsync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use layoutsync_server::server::{router, ApiKeyStore, AppState, LayoutFileStore, ServerConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "layoutsync_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env();

    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        format!(
            "Failed to create data directory {}: {}",
            config.data_dir.display(),
            e
        )
    })?;

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let state = AppState {
        api_keys: Arc::new(ApiKeyStore::load(&config.config_path)),
        layouts: Arc::new(LayoutFileStore::new(config.data_dir.clone())),
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}
