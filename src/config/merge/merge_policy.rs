//! Defaults layer: the serialized `OrchardConfig::default()` sits under
//! every other source, so any key a file omits keeps its built-in value.

use crate::config::OrchardConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Config::try_from(&OrchardConfig::default())?;
    Ok(Config::builder().add_source(defaults))
}
