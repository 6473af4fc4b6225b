use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod context;

use commands::{ConfigCommand, LayoutCommand, SyncCommand, WatchCommand};
use config::Config;
use context::LayoutContext;
use layoutsync_core::{BackendKind, SyncOutcome};

#[derive(Parser)]
#[command(name = "layouts")]
#[command(version)]
#[command(about = "Manage layouts and keep them in sync with a server", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Layout(LayoutCommand),

    /// Sync layouts with the server now
    Sync(SyncCommand),

    /// Keep syncing in the background until interrupted
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("layouts=info,layoutsync_core=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Layout(cmd)) => {
            let context = LayoutContext::open(&config).await?;

            // Pull before reads so they see the server's layouts.
            if cmd.is_read() {
                auto_sync(&context).await;
            }

            let storage = context.storage();
            cmd.run(storage.as_ref()).await?;

            // Push after writes (only reached if the command succeeded).
            if !cmd.is_read() {
                auto_sync(&context).await;
            }
        }
        Some(Commands::Sync(cmd)) => {
            let context = LayoutContext::open(&config).await?;
            cmd.run(&context, &config).await?;
        }
        Some(Commands::Watch(cmd)) => {
            let context = LayoutContext::open(&config).await?;
            cmd.run(context).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config, cli_config_path)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

/// Syncs once if the reconciling backend is active. Failures are reported by
/// the notifier and never fail the command.
async fn auto_sync(context: &LayoutContext) {
    let kind = context.controller.active_backend().borrow().kind();
    if kind != BackendKind::Reconciling {
        return;
    }
    if let SyncOutcome::Synced { conflicts } = context.controller.invoker().sync().await {
        for conflict in &conflicts {
            eprintln!("Conflict: {}", conflict);
        }
    }
}
