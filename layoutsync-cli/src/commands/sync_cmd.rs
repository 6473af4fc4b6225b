//! Sync CLI commands for reconciling layouts with the server.

use clap::{Args, Subcommand};

use layoutsync_core::{check_server, BackendKind, SyncOutcome};

use crate::config::Config;
use crate::context::LayoutContext;

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and server status
    Status,
}

impl SyncCommand {
    pub async fn run(
        &self,
        context: &LayoutContext,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(context).await,
            Some(SyncSubcommand::Status) => self.status(context, config).await,
        }
    }

    async fn sync(&self, context: &LayoutContext) -> Result<(), Box<dyn std::error::Error>> {
        println!("Syncing layouts with server...");
        println!();

        match context.controller.invoker().sync().await {
            SyncOutcome::Synced { conflicts } => {
                if conflicts.is_empty() {
                    println!("Sync complete.");
                } else {
                    println!(
                        "Sync complete with {} conflict{}:",
                        conflicts.len(),
                        if conflicts.len() == 1 { "" } else { "s" }
                    );
                    for conflict in &conflicts {
                        println!("  ! {}", conflict);
                    }
                }
                Ok(())
            }
            // The notifier has already reported the cause on stderr.
            SyncOutcome::Failed { .. } => Err("Sync failed".into()),
            SyncOutcome::Unavailable => {
                println!("Remote layouts are not enabled; layouts are stored locally only.");
                println!("Run 'layouts sync status' for details.");
                Ok(())
            }
        }
    }

    async fn status(
        &self,
        context: &LayoutContext,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let kind = context.controller.active_backend().borrow().kind();
        println!("Backend:        {}", kind);
        println!(
            "Remote layouts: {}",
            if config.sync.remote_layouts {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!("Interval:       {}s", config.sync.interval().as_secs());

        let Some(server_url) = config.sync.server_url.as_ref() else {
            println!();
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"http://localhost:8080\"");
            println!("    api_key: \"<your key>\"");
            println!("    remote_layouts: true");
            println!();
            println!("Or set environment variables:");
            println!("  LAYOUTS_SYNC_URL, LAYOUTS_SYNC_API_KEY, LAYOUTS_REMOTE_LAYOUTS");
            return Ok(());
        };

        println!("Server:         {}", server_url);
        println!(
            "Signed in:      {}",
            if config.sync.session().is_some() {
                "yes"
            } else {
                "no (missing api_key)"
            }
        );
        println!();

        print!("Server status: ");
        if check_server(server_url).await {
            println!("✓ reachable");
        } else {
            println!("✗ unreachable");
        }

        if kind == BackendKind::CacheOnly && config.sync.is_configured() {
            println!();
            println!("Set 'remote_layouts: true' to store layouts on the server.");
        }

        Ok(())
    }
}
