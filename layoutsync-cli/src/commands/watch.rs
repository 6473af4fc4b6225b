//! Long-running mode: keeps layouts reconciled on the controller's timer.

use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use layoutsync_core::{check_server, DebugHandle, EnvironmentSignals, SyncOutcome};

use crate::context::LayoutContext;

const PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Run the sync controller until interrupted
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Accept `sync` on stdin to trigger a sync immediately (development builds only)
    #[arg(long)]
    pub debug: bool,
}

impl WatchCommand {
    pub async fn run(&self, context: LayoutContext) -> Result<(), Box<dyn std::error::Error>> {
        let LayoutContext {
            signals,
            controller,
            remote,
        } = context;

        let mut state = controller.state();
        let mut active = controller.active_backend();
        let debug_handle = controller.debug_handle();

        println!(
            "Watching layouts ({} backend). Press Ctrl-C to stop.",
            active.borrow().kind()
        );

        // Unreachable until the first probe answers.
        signals.set_network_reachable(false);
        if let Some(remote) = remote {
            let url = remote.server_url().to_string();
            tokio::spawn(probe_network(Arc::clone(&signals), url));
        }

        let controller_task = tokio::spawn(controller.run(async {
            let _ = tokio::signal::ctrl_c().await;
        }));

        if self.debug {
            if debug_handle.borrow().is_some() {
                println!("Debug mode: type 'sync' and press Enter to sync now.");
                tokio::spawn(read_debug_commands(debug_handle));
            } else {
                println!("Debug sync is only available in development builds with a session.");
            }
        }

        tokio::spawn(async move {
            while active.changed().await.is_ok() {
                let kind = active.borrow_and_update().kind();
                println!("Active backend: {}", kind);
            }
        });
        tokio::spawn(async move {
            while state.changed().await.is_ok() {
                let current = *state.borrow_and_update();
                tracing::debug!("Controller state: {:?}", current);
            }
        });

        controller_task.await?;
        drop(signals);
        println!("Stopped.");
        Ok(())
    }
}

/// Polls the server's health endpoint and feeds the result into the gate.
async fn probe_network(signals: Arc<EnvironmentSignals>, server_url: String) {
    let mut ticker = tokio::time::interval(PROBE_INTERVAL);
    loop {
        ticker.tick().await;
        let reachable = check_server(&server_url).await;
        tracing::debug!(reachable, "Probed {}", server_url);
        signals.set_network_reachable(reachable);
    }
}

async fn read_debug_commands(handle: watch::Receiver<Option<DebugHandle>>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim() != "sync" {
            println!("Unknown command '{}'; try 'sync'.", line.trim());
            continue;
        }
        let current = handle.borrow().clone();
        let Some(debug) = current else {
            println!("Debug sync is not available right now.");
            continue;
        };
        match debug.sync_now().await {
            SyncOutcome::Synced { conflicts } => {
                println!("Synced ({} conflict(s)).", conflicts.len());
                for conflict in &conflicts {
                    println!("  ! {}", conflict);
                }
            }
            SyncOutcome::Failed { message } => println!("Sync failed: {}", message),
            SyncOutcome::Unavailable => println!("Remote layouts are not active."),
        }
    }
}
