//! MergeService: stacks the sources and deserializes the result.

use crate::config::sources::{environment, global_file, workspace_file};
use crate::config::OrchardConfig;
use config::{ConfigError, File, FileFormat};
use std::path::Path;

use super::merge_policy;

pub struct MergeService;

impl MergeService {
    /// Precedence: defaults (lowest), global file, workspace file,
    /// environment (highest).
    pub fn load(workspace_root: &Path) -> Result<OrchardConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder)?;
        builder.build()?.try_deserialize()
    }

    /// Load from one explicit file with the environment on top.
    pub fn load_from_file(path: &Path) -> Result<OrchardConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        let builder = environment::add_to_builder(builder)?;
        builder.build()?.try_deserialize()
    }
}
