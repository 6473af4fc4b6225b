mod config_cmd;
mod layout;
mod sync_cmd;
mod watch;

pub use config_cmd::ConfigCommand;
pub use layout::LayoutCommand;
pub use sync_cmd::SyncCommand;
pub use watch::WatchCommand;
