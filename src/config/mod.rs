//! Configuration
//!
//! Layered settings: built-in defaults, then the global file
//! (`$XDG_CONFIG_HOME/orchard/config.toml`), then the workspace file
//! (`<workspace>/orchard.toml`), then `ORCHARD__SECTION__KEY` environment
//! variables.

pub mod facade;
pub mod merge;
pub mod paths;
pub mod sources;
pub mod workspace;

pub use facade::ConfigLoader;
pub use paths::xdg_root as xdg;
pub use workspace::storage_paths::StoreConfig;

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Drag and synchronization tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DragConfig {
    /// Height share of each reorder band on rows that also accept combine.
    #[serde(default = "default_edge_fraction")]
    pub edge_fraction: f64,

    /// Reload affected sibling lists after a failed write.
    #[serde(default = "default_true")]
    pub refetch_on_failure: bool,
}

fn default_edge_fraction() -> f64 {
    0.25
}

fn default_true() -> bool {
    true
}

impl Default for DragConfig {
    fn default() -> Self {
        DragConfig {
            edge_fraction: default_edge_fraction(),
            refetch_on_failure: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchardConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub drag: DragConfig,
}

impl OrchardConfig {
    /// Reject values the rest of the crate cannot work with.
    pub fn validate(&self) -> Result<(), crate::error::ApiError> {
        if !(self.drag.edge_fraction > 0.0 && self.drag.edge_fraction <= 0.5) {
            return Err(crate::error::ApiError::ConfigError(format!(
                "drag.edge_fraction must be in (0, 0.5], got {}",
                self.drag.edge_fraction
            )));
        }
        Ok(())
    }
}
