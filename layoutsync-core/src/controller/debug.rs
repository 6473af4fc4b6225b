//! Debug introspection surface.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::invoker::{SyncInvoker, SyncOutcome};

/// Build configuration the controller runs under. The debug surface is only
/// offered outside production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    /// The mode implied by how this binary was compiled.
    pub fn current() -> Self {
        if cfg!(debug_assertions) {
            BuildMode::Development
        } else {
            BuildMode::Production
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, BuildMode::Production)
    }
}

impl Default for BuildMode {
    fn default() -> Self {
        Self::current()
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildMode::Development => write!(f, "development"),
            BuildMode::Production => write!(f, "production"),
        }
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(BuildMode::Development),
            "production" | "prod" => Ok(BuildMode::Production),
            other => Err(format!("unknown build mode '{}'", other)),
        }
    }
}

/// Manual sync trigger for debugging tools.
///
/// Wraps the same [`SyncInvoker`] the periodic timer uses, so a manual sync
/// behaves exactly like a scheduled one.
#[derive(Clone)]
pub struct DebugHandle {
    invoker: SyncInvoker,
}

impl DebugHandle {
    pub fn new(invoker: SyncInvoker) -> Self {
        Self { invoker }
    }

    pub async fn sync_now(&self) -> SyncOutcome {
        self.invoker.sync().await
    }

    /// True if both handles trigger the same invoker.
    pub fn same_handle(&self, other: &DebugHandle) -> bool {
        self.invoker.same_invoker(&other.invoker)
    }
}

impl std::fmt::Debug for DebugHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugHandle").finish_non_exhaustive()
    }
}

/// Whether the debug handle may be exposed.
pub fn debug_handle_available(build_mode: BuildMode, session_present: bool) -> bool {
    !build_mode.is_production() && session_present
}
