//! ConfigLoader facade delegating to the merge service.

use super::merge::service::MergeService;
use super::OrchardConfig;
use crate::error::ApiError;
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration for a workspace.
    pub fn load(workspace_root: &Path) -> Result<OrchardConfig, ApiError> {
        let config = MergeService::load(workspace_root)?;
        config.validate()?;
        debug!(workspace = %workspace_root.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load and validate configuration from one file.
    pub fn load_from_file(path: &Path) -> Result<OrchardConfig, ApiError> {
        let config = MergeService::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Render a configuration as TOML.
    pub fn to_toml(config: &OrchardConfig) -> Result<String, ApiError> {
        toml::to_string_pretty(config)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}
